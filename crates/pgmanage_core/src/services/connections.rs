//! Connections store and the serialized database-switch queue.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::DrainOrder;
use crate::emitter::{Emitter, Event};
use crate::error::ClientError;
use crate::models::{
    ChangeDatabaseRequest, Connection, ConnectionGroup, ConnectionId, ConnectionUpdate, Tab,
    Technology,
};
use crate::services::api::Api;
use crate::services::tabs::TabsStore;

#[derive(Debug, Default)]
struct SwitchState {
    pending: Vec<ChangeDatabaseRequest>,
    running: bool,
}

/// Queue of `/change_active_database/` requests with at most one in flight.
struct SwitchQueue {
    state: Mutex<SwitchState>,
    idle: watch::Sender<bool>,
    order: DrainOrder,
}

impl SwitchQueue {
    fn new(order: DrainOrder) -> Self {
        let (idle, _) = watch::channel(true);
        Self { state: Mutex::new(SwitchState::default()), idle, order }
    }

    /// Push a request. Returns true when the caller must start draining.
    fn push(&self, request: ChangeDatabaseRequest) -> bool {
        let mut state = self.state.lock();
        state.pending.push(request);
        if state.running {
            return false;
        }
        state.running = true;
        self.idle.send_replace(false);
        true
    }

    /// Take the next request, or mark the queue idle when empty.
    fn take(&self) -> Option<ChangeDatabaseRequest> {
        let mut state = self.state.lock();
        let next = match self.order {
            DrainOrder::Lifo => state.pending.pop(),
            DrainOrder::Fifo if state.pending.is_empty() => None,
            DrainOrder::Fifo => Some(state.pending.remove(0)),
        };
        if next.is_none() {
            state.running = false;
            self.idle.send_replace(true);
        }
        next
    }

    fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Store of configured connections.
pub struct ConnectionsStore {
    api: Api,
    tabs: Arc<TabsStore>,
    emitter: Emitter,
    runtime: tokio::runtime::Handle,
    connections: RwLock<Vec<Connection>>,
    groups: RwLock<Vec<ConnectionGroup>>,
    switches: Arc<SwitchQueue>,
}

impl ConnectionsStore {
    /// Create an empty store. Database switches run on `runtime`.
    pub fn new(
        api: Api,
        tabs: Arc<TabsStore>,
        emitter: Emitter,
        runtime: tokio::runtime::Handle,
        order: DrainOrder,
    ) -> Self {
        Self {
            api,
            tabs,
            emitter,
            runtime,
            connections: RwLock::new(Vec::new()),
            groups: RwLock::new(Vec::new()),
            switches: Arc::new(SwitchQueue::new(order)),
        }
    }

    // ========== Connection list ==========

    /// Fetch connections and groups from the backend.
    pub async fn load_connections(&self) -> Result<usize, ClientError> {
        let list = self.api.get_connections().await?;
        let count = list.connections.len();
        self.set_connections(list.connections);
        *self.groups.write() = list.groups;
        tracing::info!(count, "Connections loaded");
        Ok(count)
    }

    /// Replace the connection list.
    pub fn set_connections(&self, connections: Vec<Connection>) {
        *self.connections.write() = connections;
    }

    /// Snapshot of all connections in server order.
    pub fn connections(&self) -> Vec<Connection> {
        self.connections.read().clone()
    }

    /// Connection groups.
    pub fn groups(&self) -> Vec<ConnectionGroup> {
        self.groups.read().clone()
    }

    /// Whether any connection is configured.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Connection by id.
    pub fn get_connection(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.read().iter().find(|c| c.id == id).cloned()
    }

    /// Edit a connection in place.
    pub fn update_connection(&self, id: ConnectionId, update: ConnectionUpdate) -> Result<(), ClientError> {
        let mut connections = self.connections.write();
        let conn = connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ClientError::invalid_state(format!("Connection {id} not found")))?;
        update.apply(conn);
        tracing::debug!(connection_id = id, "Connection updated");
        Ok(())
    }

    /// Remove a deleted connection.
    pub fn remove_connection(&self, id: ConnectionId) -> Option<Connection> {
        let mut connections = self.connections.write();
        let index = connections.iter().position(|c| c.id == id)?;
        tracing::debug!(connection_id = id, "Connection removed");
        Some(connections.remove(index))
    }

    /// Terminal connections.
    pub fn remote_terminals(&self) -> Vec<Connection> {
        self.connections
            .read()
            .iter()
            .filter(|c| c.technology == Technology::Terminal)
            .cloned()
            .collect()
    }

    /// Connections with pinned ones first, each group ordered by alias ignoring case.
    pub fn sorted_connections(&self) -> Vec<Connection> {
        let mut connections = self.connections();
        connections.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| a.alias.to_lowercase().cmp(&b.alias.to_lowercase()))
        });
        connections
    }

    /// Most recently opened connections first.
    pub fn recent_connections(&self, limit: usize) -> Vec<Connection> {
        let mut connections: Vec<Connection> =
            self.connections().into_iter().filter(|c| c.last_access_date.is_some()).collect();
        connections.sort_by(|a, b| b.last_access_date.cmp(&a.last_access_date));
        connections.truncate(limit);
        connections
    }

    // ========== Actions ==========

    /// Open a connection: stamps its access time and creates a terminal or
    /// database workspace depending on its technology.
    pub fn select_connection(&self, id: ConnectionId) -> Result<Tab, ClientError> {
        let conn = {
            let mut connections = self.connections.write();
            let conn = connections
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| ClientError::invalid_state(format!("Connection {id} not found")))?;
            conn.last_access_date = Some(Utc::now());
            conn.clone()
        };

        tracing::debug!(connection_id = id, technology = conn.technology.as_str(), "Selecting connection");

        if conn.technology.is_terminal() {
            self.tabs.create_terminal_tab(conn.id, &conn.alias, &conn.terminal_details())
        } else {
            self.tabs.create_connection_tab(&conn)
        }
    }

    /// Validate connection parameters on the backend. Errors are returned untouched.
    pub async fn test_connection(&self, connection: &Connection) -> Result<String, ClientError> {
        self.api.test_connection(connection).await
    }

    // ========== Database switch queue ==========

    /// Queue a database switch. Only one `/change_active_database/` call is in
    /// flight at a time; the queue keeps draining after failures.
    pub fn queue_change_active_database(&self, request: ChangeDatabaseRequest) {
        tracing::debug!(
            database_index = request.database_index,
            workspace_id = %request.workspace_id,
            database = %request.database,
            "Queueing database switch"
        );
        if !self.switches.push(request) {
            return;
        }

        let api = self.api.clone();
        let queue = Arc::clone(&self.switches);
        let tabs = Arc::clone(&self.tabs);
        let emitter = self.emitter.clone();
        self.runtime.spawn(async move {
            while let Some(request) = queue.take() {
                match api.change_active_database(&request).await {
                    Ok(()) => {
                        if let Err(e) = tabs.update_meta(request.workspace_id, |meta| {
                            meta.selected_database = Some(request.database.clone());
                        }) {
                            tracing::debug!(error = %e, "Workspace closed before switch completed");
                        }
                        emitter.emit(Event::DatabaseChanged {
                            workspace_id: request.workspace_id,
                            database: request.database.clone(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            database_index = request.database_index,
                            database = %request.database,
                            error = %e,
                            "Database switch failed"
                        );
                        api.reporter().handle_error(&e);
                    }
                }
            }
        });
    }

    /// Requests waiting behind the one in flight.
    pub fn pending_database_switches(&self) -> usize {
        self.switches.pending_len()
    }

    /// Wait until every queued switch has completed.
    pub async fn wait_database_switches_idle(&self) {
        let mut idle = self.switches.idle.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Record the database last used by a connection.
    pub fn set_last_used_database(&self, id: ConnectionId, database: &str) {
        if let Some(conn) = self.connections.write().iter_mut().find(|c| c.id == id) {
            conn.last_used_database = Some(database.to_string());
        }
    }
}

impl std::fmt::Debug for ConnectionsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionsStore")
            .field("connections", &self.connections.read().len())
            .field("pending_switches", &self.switches.pending_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TabMode;
    use crate::services::reporter::ErrorReporter;
    use crate::test_support::{MockTransport, RecordingNotifier};
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    fn store_with(transport: Arc<MockTransport>, order: DrainOrder) -> (ConnectionsStore, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let api = Api::new(transport, Arc::new(ErrorReporter::new(notifier.clone())));
        let store = ConnectionsStore::new(
            api,
            Arc::new(TabsStore::new()),
            Emitter::new(),
            tokio::runtime::Handle::current(),
            order,
        );
        (store, notifier)
    }

    fn switch(database: &str) -> ChangeDatabaseRequest {
        ChangeDatabaseRequest { database_index: 1, workspace_id: Uuid::nil(), database: database.into() }
    }

    fn switched_databases(transport: &MockTransport) -> Vec<String> {
        transport
            .bodies("/change_active_database/")
            .iter()
            .map(|b| b["database"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_switches_never_overlap() {
        let transport = Arc::new(MockTransport::new());
        transport.set_delay("/change_active_database/", Duration::from_millis(10));
        let (store, _) = store_with(transport.clone(), DrainOrder::Lifo);

        for i in 0..5 {
            store.queue_change_active_database(switch(&format!("db{i}")));
        }
        store.wait_database_switches_idle().await;

        assert_eq!(transport.call_count("/change_active_database/"), 5);
        assert_eq!(transport.max_in_flight("/change_active_database/"), 1);
        assert_eq!(store.pending_database_switches(), 0);
    }

    #[tokio::test]
    async fn test_lifo_takes_most_recent_first() {
        let transport = Arc::new(MockTransport::new());
        let gate = transport.pause("/change_active_database/");
        let (store, _) = store_with(transport.clone(), DrainOrder::Lifo);

        store.queue_change_active_database(switch("a"));
        store.queue_change_active_database(switch("b"));
        store.queue_change_active_database(switch("c"));
        gate.add_permits(3);
        store.wait_database_switches_idle().await;

        assert_eq!(switched_databases(&transport), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_fifo_order_when_configured() {
        let transport = Arc::new(MockTransport::new());
        let gate = transport.pause("/change_active_database/");
        let (store, _) = store_with(transport.clone(), DrainOrder::Fifo);

        store.queue_change_active_database(switch("a"));
        store.queue_change_active_database(switch("b"));
        store.queue_change_active_database(switch("c"));
        gate.add_permits(3);
        store.wait_database_switches_idle().await;

        assert_eq!(switched_databases(&transport), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stall_queue() {
        let transport = Arc::new(MockTransport::new());
        transport.fail("/change_active_database/", 400, r#"{ "data": "database \"x\" does not exist" }"#);
        transport.set_delay("/change_active_database/", Duration::from_millis(5));
        let (store, notifier) = store_with(transport.clone(), DrainOrder::Lifo);

        store.queue_change_active_database(switch("x"));
        store.queue_change_active_database(switch("y"));
        store.wait_database_switches_idle().await;

        assert_eq!(transport.call_count("/change_active_database/"), 2);
        assert_eq!(notifier.toasts().len(), 1);

        // Queue is usable again after draining
        store.queue_change_active_database(switch("z"));
        store.wait_database_switches_idle().await;
        assert_eq!(transport.call_count("/change_active_database/"), 3);
    }

    #[tokio::test]
    async fn test_select_connection_dispatches_by_technology() {
        let transport = Arc::new(MockTransport::new());
        let (store, _) = store_with(transport, DrainOrder::Lifo);
        let mut terminal = Connection::new(2, "bastion", Technology::Terminal);
        terminal.user = "ops".into();
        terminal.server = "jump".into();
        terminal.port = "22".into();
        store.set_connections(vec![Connection::new(1, "prod", Technology::Postgresql), terminal]);

        let db_tab = store.select_connection(1).unwrap();
        assert_eq!(db_tab.mode, TabMode::Connection);
        assert!(store.get_connection(1).unwrap().last_access_date.is_some());

        let term_tab = store.select_connection(2).unwrap();
        assert_eq!(term_tab.mode, TabMode::Terminal);
        assert_eq!(term_tab.meta.terminal_details.as_deref(), Some("ops@jump:22"));

        assert!(store.select_connection(99).is_err());
    }

    #[tokio::test]
    async fn test_list_views() {
        let transport = Arc::new(MockTransport::new());
        let (store, _) = store_with(transport, DrainOrder::Lifo);
        let mut pinned = Connection::new(3, "zeta", Technology::Mysql);
        pinned.pinned = true;
        store.set_connections(vec![
            Connection::new(1, "beta", Technology::Postgresql),
            Connection::new(2, "Alpha", Technology::Terminal),
            pinned,
        ]);

        let order: Vec<_> = store.sorted_connections().iter().map(|c| c.id).collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(store.remote_terminals().len(), 1);

        store.select_connection(1).unwrap();
        assert_eq!(store.recent_connections(5).iter().map(|c| c.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_test_connection_propagates_untouched() {
        let transport = Arc::new(MockTransport::new());
        transport.fail("/test_connection/", 400, r#"{ "data": "password authentication failed" }"#);
        let (store, notifier) = store_with(transport, DrainOrder::Lifo);

        let err = store
            .test_connection(&Connection::new(1, "prod", Technology::Postgresql))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "password authentication failed");
        assert!(notifier.toasts().is_empty());
    }

    #[tokio::test]
    async fn test_load_connections() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "/get_connections/",
            json!({ "v_conn_list": [{ "id": 1, "alias": "a", "technology": "postgresql" }],
                    "v_group_list": [{ "id": 1, "name": "prod", "conn_list": [1] }] }),
        );
        let (store, _) = store_with(transport, DrainOrder::Lifo);

        assert_eq!(store.load_connections().await.unwrap(), 1);
        assert_eq!(store.groups()[0].conn_list, vec![1]);
    }
}
