//! Application state management.
//!
//! [`AppState`] wires the transport, the stores and the tab factories
//! together and owns the tokio runtime they run on. Implements `gpui::Global`
//! when the `gpui` feature is enabled.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::dialect::Dialect;
use crate::emitter::{Emitter, Event, Subscription, Topic};
use crate::error::ClientError;
use crate::factories::{TabFactories, WidgetFactory};
use crate::models::{ConnectionId, TabId, TreeNode};
use crate::services::{
    Api, ConnectionsStore, DbMetadataStore, ErrorReporter, FileManager, Notifier, Session,
    SettingsStore, SnippetsStore, TabsStore, Transport,
};
use crate::tree::{NodeLoader, RestNodeLoader, TreeContext, TreeController};

type TreeRegistry = Arc<RwLock<HashMap<TabId, Arc<TreeController>>>>;

/// Central application state.
pub struct AppState {
    config: ClientConfig,
    api: Api,
    emitter: Emitter,
    tabs: Arc<TabsStore>,
    connections: Arc<ConnectionsStore>,
    db_metadata: DbMetadataStore,
    settings: Arc<SettingsStore>,
    snippets: SnippetsStore,
    file_manager: FileManager,
    session: Session,
    factories: TabFactories,
    trees: TreeRegistry,
    _tab_closed: Subscription,
    runtime_handle: tokio::runtime::Handle,
    /// Owned runtime; `None` when running on an injected handle
    tokio_runtime: Option<tokio::runtime::Runtime>,
}

impl AppState {
    /// Create application state with its own multi-threaded runtime.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        widgets: Arc<dyn WidgetFactory>,
    ) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| ClientError::internal(format!("Failed to create tokio runtime: {e}")))?;
        let handle = runtime.handle().clone();
        let mut state = Self::assemble(config, transport, notifier, widgets, handle);
        state.tokio_runtime = Some(runtime);
        Ok(state)
    }

    /// Create application state on an existing runtime.
    pub fn with_runtime(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        widgets: Arc<dyn WidgetFactory>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self::assemble(config, transport, notifier, widgets, runtime)
    }

    fn assemble(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        widgets: Arc<dyn WidgetFactory>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let api = Api::new(transport, Arc::new(ErrorReporter::new(notifier)));
        let emitter = Emitter::new();
        let tabs = Arc::new(TabsStore::new());
        let connections = Arc::new(ConnectionsStore::new(
            api.clone(),
            tabs.clone(),
            emitter.clone(),
            runtime.clone(),
            config.switch_drain_order,
        ));
        let settings = Arc::new(SettingsStore::new(api.clone()));
        let session = Session::new(api.clone(), tabs.clone(), runtime.clone(), config.keep_alive_interval());
        let factories = TabFactories::new(
            api.clone(),
            tabs.clone(),
            connections.clone(),
            settings.clone(),
            emitter.clone(),
            widgets,
            runtime.clone(),
        );

        // A closed workspace takes its tree with it
        let trees: TreeRegistry = Arc::new(RwLock::new(HashMap::new()));
        let registry = Arc::clone(&trees);
        let tab_closed = emitter.on(Topic::TabClosed, move |event| {
            if let Event::TabClosed { tab_id, workspace_id: None } = event {
                if let Some(tree) = registry.write().remove(tab_id) {
                    tree.unbind();
                }
            }
        });

        tracing::info!(base_url = %config.base_url, "AppState initialized");

        Self {
            db_metadata: DbMetadataStore::new(api.clone()),
            snippets: SnippetsStore::new(api.clone(), emitter.clone()),
            file_manager: FileManager::new(api.clone()),
            config,
            api,
            emitter,
            tabs,
            connections,
            settings,
            session,
            factories,
            trees,
            _tab_closed: tab_closed,
            runtime_handle: runtime,
            tokio_runtime: None,
        }
    }

    // ========== Trees ==========

    /// Create and bind the object tree of a database workspace, loading
    /// children through the dialect's REST endpoints.
    pub fn open_tree(&self, workspace_id: TabId, roots: Vec<TreeNode>) -> Result<Arc<TreeController>, ClientError> {
        let workspace = self
            .tabs
            .get_tab(workspace_id)
            .ok_or_else(|| ClientError::invalid_state(format!("Workspace {workspace_id} not found")))?;
        let (Some(connection_id), Some(technology)) = (workspace.meta.connection_id, workspace.meta.technology)
        else {
            return Err(ClientError::invalid_state("Workspace has no database connection"));
        };
        let dialect = Dialect::from_technology(technology).ok_or_else(|| {
            ClientError::invalid_state(format!("No object tree for {} connections", technology.as_str()))
        })?;

        let loader: Arc<dyn NodeLoader> =
            Arc::new(RestNodeLoader::new(self.api.scoped(connection_id, workspace_id), dialect));
        Ok(self.open_tree_with(workspace_id, connection_id, dialect, loader, roots))
    }

    /// Create and bind a tree with a custom loader.
    pub fn open_tree_with(
        &self,
        workspace_id: TabId,
        connection_id: ConnectionId,
        dialect: Dialect,
        loader: Arc<dyn NodeLoader>,
        roots: Vec<TreeNode>,
    ) -> Arc<TreeController> {
        let ctx = TreeContext {
            connections: self.connections.clone(),
            tabs: self.tabs.clone(),
            emitter: self.emitter.clone(),
            runtime: self.runtime_handle.clone(),
            throttle: self.config.node_refresh_throttle(),
            properties_debounce: self.config.properties_debounce(),
            settings: self.settings.clone(),
        };
        let tree = TreeController::new(ctx, self.api.scoped(connection_id, workspace_id), dialect, loader, roots);
        tree.bind();
        if let Some(previous) = self.trees.write().insert(workspace_id, tree.clone()) {
            previous.unbind();
        }
        tracing::debug!(workspace_id = %workspace_id, dialect = ?dialect, "Tree opened");
        tree
    }

    /// Tree of a workspace.
    pub fn tree(&self, workspace_id: TabId) -> Option<Arc<TreeController>> {
        self.trees.read().get(&workspace_id).cloned()
    }

    // ========== Service Accessors ==========

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn tabs(&self) -> &Arc<TabsStore> {
        &self.tabs
    }

    pub fn connections(&self) -> &Arc<ConnectionsStore> {
        &self.connections
    }

    pub fn db_metadata(&self) -> &DbMetadataStore {
        &self.db_metadata
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn snippets(&self) -> &SnippetsStore {
        &self.snippets
    }

    pub fn file_manager(&self) -> &FileManager {
        &self.file_manager
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn factories(&self) -> &TabFactories {
        &self.factories
    }

    // ========== Runtime ==========

    /// Handle to the runtime the stores spawn on.
    pub fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime_handle
    }

    /// Spawn a future on the runtime.
    pub fn spawn<F, T>(&self, future: F) -> tokio::task::JoinHandle<T>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.runtime_handle.spawn(future)
    }

    /// Block on a future using the owned runtime.
    ///
    /// Must not be called from inside the runtime.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        match &self.tokio_runtime {
            Some(runtime) => runtime.block_on(future),
            None => self.runtime_handle.block_on(future),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("base_url", &self.config.base_url)
            .field("trees", &self.trees.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "gpui")]
impl gpui::Global for AppState {}
