//! Cached schema metadata used for autocomplete and DDL modals.

use serde::{Deserialize, Serialize};

/// A table or view with its column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationMeta {
    /// Relation name
    pub name: String,
    /// Column names
    pub columns: Vec<String>,
}

/// A schema with its relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaMeta {
    /// Schema name
    pub name: String,
    /// Tables
    pub tables: Vec<RelationMeta>,
    /// Views
    pub views: Vec<RelationMeta>,
}

impl SchemaMeta {
    /// Look up a table or view by name.
    pub fn relation(&self, name: &str) -> Option<&RelationMeta> {
        self.tables.iter().chain(self.views.iter()).find(|r| r.name == name)
    }
}

/// Response body of `/get_database_meta/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseMeta {
    /// Schemas of the requested database
    pub schemas: Vec<SchemaMeta>,
    /// All databases reachable through the connection
    pub databases: Vec<String>,
}
