//! Per-connection cache of schema metadata.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::ClientError;
use crate::models::{ConnectionId, DatabaseMeta, SchemaMeta, TabId};
use crate::services::api::Api;

/// Metadata cache keyed by connection and database name.
pub struct DbMetadataStore {
    api: Api,
    cache: RwLock<HashMap<ConnectionId, HashMap<String, DatabaseMeta>>>,
}

impl DbMetadataStore {
    pub fn new(api: Api) -> Self {
        Self { api, cache: RwLock::new(HashMap::new()) }
    }

    /// Cached metadata of one database.
    pub fn get_db_meta(&self, connection_id: ConnectionId, database: &str) -> Option<DatabaseMeta> {
        self.cache.read().get(&connection_id).and_then(|dbs| dbs.get(database)).cloned()
    }

    /// Schemas of one database, empty when not cached.
    pub fn schemas(&self, connection_id: ConnectionId, database: &str) -> Vec<SchemaMeta> {
        self.get_db_meta(connection_id, database).map(|m| m.schemas).unwrap_or_default()
    }

    /// Databases reachable through a connection, as reported by the last fetch.
    pub fn get_databases(&self, connection_id: ConnectionId) -> Vec<String> {
        let cache = self.cache.read();
        let Some(dbs) = cache.get(&connection_id) else {
            return Vec::new();
        };
        let mut databases: Vec<String> =
            dbs.values().flat_map(|m| m.databases.iter().cloned()).collect();
        databases.sort();
        databases.dedup();
        databases
    }

    /// Fetch metadata unless it is already cached.
    pub async fn fetch_db_meta(
        &self,
        connection_id: ConnectionId,
        workspace_id: TabId,
        database: &str,
    ) -> Result<(), ClientError> {
        if self.get_db_meta(connection_id, database).is_some() {
            tracing::trace!(connection_id, database, "Metadata already cached");
            return Ok(());
        }
        self.refresh_db_meta(connection_id, workspace_id, database).await
    }

    /// Fetch metadata and replace the cached entry.
    pub async fn refresh_db_meta(
        &self,
        connection_id: ConnectionId,
        workspace_id: TabId,
        database: &str,
    ) -> Result<(), ClientError> {
        let meta = self.api.get_database_meta(connection_id, workspace_id, database).await?;
        tracing::debug!(connection_id, database, schemas = meta.schemas.len(), "Metadata refreshed");
        self.cache
            .write()
            .entry(connection_id)
            .or_default()
            .insert(database.to_string(), meta);
        Ok(())
    }

    /// Drop everything cached for a connection.
    pub fn delete_db_meta(&self, connection_id: ConnectionId) {
        if self.cache.write().remove(&connection_id).is_some() {
            tracing::debug!(connection_id, "Metadata dropped");
        }
    }
}

impl std::fmt::Debug for DbMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbMetadataStore").field("connections", &self.cache.read().len()).finish()
    }
}
