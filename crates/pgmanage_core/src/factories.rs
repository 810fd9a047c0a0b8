//! Tab-type factories.
//!
//! A factory opens a tab in the [`TabsStore`], builds the widgets the tab
//! owns and keeps them in a [`TabHandle`]. Closing runs the other way:
//! widgets are destroyed first, then the tab leaves the store and the backend
//! is told which sessions were released.

use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::dialect::Dialect;
use crate::emitter::{Emitter, Event};
use crate::error::ClientError;
use crate::models::{ConnectionId, Tab, TabId, TabMode};
use crate::services::api::{Api, CloseTabEntry, TemplateKind};
use crate::services::connections::ConnectionsStore;
use crate::services::reporter::{ConfirmRequest, ToastLevel};
use crate::services::settings::SettingsStore;
use crate::services::tabs::TabsStore;

/// Toast shown when a workspace is requested before any connection exists.
pub const NO_CONNECTIONS_MESSAGE: &str = "Create connections first.";

/// Question asked before closing a tab with unsaved edits.
pub const DISCARD_TAB_MESSAGE: &str = "Are you sure you wish to discard the current changes?";

const MONITOR_REFRESH_PATH: &str = "/refresh_monitor_units/";

// ========== Widgets ==========

/// Kind of an externally rendered widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    /// Code editor
    Editor,
    /// Terminal emulator
    Terminal,
    /// Data grid
    Grid,
}

/// A widget instance owned by exactly one tab.
pub trait Widget: Send + Sync {
    fn kind(&self) -> WidgetKind;

    /// Release the widget. Called once, before its tab leaves the store.
    fn destroy(&self);
}

/// Editor configuration derived from user settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorOptions {
    pub theme: String,
    pub font_size: u32,
    pub read_only: bool,
    pub autocomplete: bool,
    pub initial_text: Option<String>,
}

impl EditorOptions {
    pub fn from_settings(settings: &SettingsStore) -> Self {
        Self {
            theme: settings.editor_theme(),
            font_size: settings.font_size(),
            read_only: false,
            autocomplete: false,
            initial_text: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn autocomplete(mut self, enabled: bool) -> Self {
        self.autocomplete = enabled;
        self
    }

    pub fn text(mut self, text: Option<String>) -> Self {
        self.initial_text = text;
        self
    }
}

/// Creates widgets for the UI shell.
pub trait WidgetFactory: Send + Sync {
    fn editor(&self, tab_id: TabId, options: EditorOptions) -> Box<dyn Widget>;
    fn terminal(&self, tab_id: TabId) -> Box<dyn Widget>;
    fn grid(&self, tab_id: TabId) -> Box<dyn Widget>;
}

// ========== Handles ==========

/// Everything a factory built for one tab.
#[derive(Clone)]
pub struct TabHandle {
    pub tab: Tab,
    widgets: Vec<Arc<dyn Widget>>,
    monitor_units: HashMap<i64, CancellationToken>,
}

impl TabHandle {
    fn new(tab: Tab, widgets: Vec<Box<dyn Widget>>) -> Self {
        Self { tab, widgets: widgets.into_iter().map(Arc::from).collect(), monitor_units: HashMap::new() }
    }

    pub fn id(&self) -> TabId {
        self.tab.id
    }

    /// Kinds of the owned widgets, in creation order.
    pub fn widget_kinds(&self) -> Vec<WidgetKind> {
        self.widgets.iter().map(|w| w.kind()).collect()
    }

    /// Ids of the monitoring units polled for this tab.
    pub fn monitor_units(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.monitor_units.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn teardown(self) {
        for token in self.monitor_units.values() {
            token.cancel();
        }
        for widget in &self.widgets {
            widget.destroy();
        }
    }
}

impl std::fmt::Debug for TabHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabHandle")
            .field("tab_id", &self.tab.id)
            .field("mode", &self.tab.mode)
            .field("widgets", &self.widget_kinds())
            .field("monitor_units", &self.monitor_units())
            .finish()
    }
}

/// Backend sessions released by closing `tab`.
///
/// A connection or terminal workspace releases one entry per secondary tab
/// plus one for itself. A secondary tab releases its own session, if any.
pub fn release_entries(tab: &Tab) -> Vec<CloseTabEntry> {
    match (tab.parent_id, tab.mode) {
        (None, TabMode::Connection | TabMode::Terminal) => {
            let mut entries: Vec<CloseTabEntry> = tab
                .secondary_tabs()
                .map(|child| CloseTabEntry {
                    conn_tab_id: tab.id,
                    tab_id: Some(child.id),
                    tab_db_id: child.meta.tab_db_id,
                })
                .collect();
            entries.push(CloseTabEntry { conn_tab_id: tab.id, tab_id: None, tab_db_id: None });
            entries
        }
        (Some(parent), mode) if mode.holds_backend_session() => {
            vec![CloseTabEntry { conn_tab_id: parent, tab_id: Some(tab.id), tab_db_id: tab.meta.tab_db_id }]
        }
        _ => Vec::new(),
    }
}

// ========== Factories ==========

/// Opens and closes tabs together with their widgets.
pub struct TabFactories {
    api: Api,
    tabs: Arc<TabsStore>,
    connections: Arc<ConnectionsStore>,
    settings: Arc<SettingsStore>,
    emitter: Emitter,
    widgets: Arc<dyn WidgetFactory>,
    runtime: Handle,
    handles: RwLock<HashMap<TabId, TabHandle>>,
}

impl TabFactories {
    pub fn new(
        api: Api,
        tabs: Arc<TabsStore>,
        connections: Arc<ConnectionsStore>,
        settings: Arc<SettingsStore>,
        emitter: Emitter,
        widgets: Arc<dyn WidgetFactory>,
        runtime: Handle,
    ) -> Self {
        Self {
            api,
            tabs,
            connections,
            settings,
            emitter,
            widgets,
            runtime,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of the handle registered for a tab.
    pub fn handle(&self, tab_id: TabId) -> Option<TabHandle> {
        self.handles.read().get(&tab_id).cloned()
    }

    /// Number of tabs with live widgets.
    pub fn open_handles(&self) -> usize {
        self.handles.read().len()
    }

    fn register(&self, handle: TabHandle) -> TabHandle {
        tracing::debug!(
            tab_id = %handle.tab.id,
            mode = handle.tab.mode.as_str(),
            widgets = handle.widgets.len(),
            "Tab handle registered"
        );
        self.handles.write().insert(handle.tab.id, handle.clone());
        handle
    }

    fn editor_options(&self, tab: &Tab) -> EditorOptions {
        let autocomplete = tab
            .meta
            .connection_id
            .and_then(|id| self.connections.get_connection(id))
            .is_some_and(|c| c.autocomplete);
        EditorOptions::from_settings(&self.settings).autocomplete(autocomplete)
    }

    // ========== Workspaces ==========

    /// Open a workspace for a connection.
    ///
    /// Database workspaces get a read-only DDL editor and a properties grid,
    /// terminal workspaces a terminal. Returns `None` when no connection is
    /// configured yet.
    pub fn open_connection(&self, connection_id: ConnectionId) -> Result<Option<TabHandle>, ClientError> {
        if self.connections.is_empty() {
            self.api.reporter().toast(ToastLevel::Error, NO_CONNECTIONS_MESSAGE);
            return Ok(None);
        }

        self.tabs.remove_placeholder_tab(None)?;
        let opened = self.connections.select_connection(connection_id);
        self.tabs.add_placeholder_tab(None)?;
        let tab = opened?;

        let widgets = if tab.mode == TabMode::Terminal {
            vec![self.widgets.terminal(tab.id)]
        } else {
            self.tabs.add_placeholder_tab(Some(tab.id))?;
            let ddl = self.editor_options(&tab).read_only();
            vec![self.widgets.editor(tab.id, ddl), self.widgets.grid(tab.id)]
        };
        Ok(Some(self.register(TabHandle::new(tab, widgets))))
    }

    // ========== Secondary tabs ==========

    fn open_secondary(
        &self,
        parent_id: TabId,
        create: impl FnOnce(&TabsStore) -> Result<Tab, ClientError>,
        build: impl FnOnce(&Tab) -> Vec<Box<dyn Widget>>,
    ) -> Result<TabHandle, ClientError> {
        self.tabs.remove_placeholder_tab(Some(parent_id))?;
        let created = create(&self.tabs);
        self.tabs.add_placeholder_tab(Some(parent_id))?;
        let tab = created?;
        let widgets = build(&tab);
        Ok(self.register(TabHandle::new(tab, widgets)))
    }

    /// Query tab: editor and result grid.
    pub fn open_query_tab(
        &self,
        workspace_id: TabId,
        name: &str,
        tab_db_id: Option<i64>,
        initial_text: Option<String>,
    ) -> Result<TabHandle, ClientError> {
        self.open_secondary(
            workspace_id,
            |tabs| tabs.create_query_tab(workspace_id, name, tab_db_id, initial_text),
            |tab| {
                let options = self.editor_options(tab).text(tab.meta.initial_text.clone());
                vec![self.widgets.editor(tab.id, options), self.widgets.grid(tab.id)]
            },
        )
    }

    /// Console tab: output terminal and input editor.
    pub fn open_console_tab(&self, workspace_id: TabId) -> Result<TabHandle, ClientError> {
        self.open_secondary(
            workspace_id,
            |tabs| tabs.create_console_tab(workspace_id),
            |tab| vec![self.widgets.terminal(tab.id), self.widgets.editor(tab.id, self.editor_options(tab))],
        )
    }

    /// Monitoring dashboard. Unit grids are added by [`start_monitor_unit`](Self::start_monitor_unit).
    pub fn open_monitor_dashboard(&self, workspace_id: TabId) -> Result<TabHandle, ClientError> {
        self.open_secondary(workspace_id, |tabs| tabs.create_monitor_dashboard_tab(workspace_id), |_| Vec::new())
    }

    /// Server configuration tab.
    pub fn open_config_tab(&self, workspace_id: TabId) -> Result<TabHandle, ClientError> {
        self.open_secondary(
            workspace_id,
            |tabs| tabs.create_config_tab(workspace_id),
            |tab| vec![self.widgets.grid(tab.id)],
        )
    }

    /// Snippet editor inside the snippet panel.
    pub fn open_snippet_tab(
        &self,
        snippet_id: Option<i64>,
        name: &str,
        text: Option<String>,
    ) -> Result<TabHandle, ClientError> {
        let panel = self.tabs.create_snippet_panel()?;
        self.open_secondary(
            panel.id,
            |tabs| tabs.create_snippet_tab(snippet_id, name, text),
            |tab| {
                let options = EditorOptions::from_settings(&self.settings).text(tab.meta.initial_text.clone());
                vec![self.widgets.editor(tab.id, options)]
            },
        )
    }

    /// Open a query tab with the SELECT template of a table and run it.
    ///
    /// The tab is named `database@schema.table`.
    pub async fn open_select_template(
        &self,
        workspace_id: TabId,
        dialect: Dialect,
        schema: Option<&str>,
        table: &str,
    ) -> Result<TabHandle, ClientError> {
        let workspace = self
            .tabs
            .get_tab(workspace_id)
            .ok_or_else(|| ClientError::invalid_state(format!("Workspace {workspace_id} not found")))?;
        let connection_id = workspace
            .meta
            .connection_id
            .ok_or_else(|| ClientError::invalid_state("Workspace has no connection"))?;

        let template = self
            .api
            .scoped(connection_id, workspace_id)
            .template(dialect, TemplateKind::Select, schema, table, None)
            .await
            .inspect_err(|e| self.api.reporter().handle_error(e))?;

        let database = workspace.meta.selected_database.unwrap_or_default();
        let name = match schema {
            Some(schema) => format!("{database}@{schema}.{table}"),
            None => format!("{database}@{table}"),
        };
        let handle = self.open_query_tab(workspace_id, &name, None, Some(template))?;
        self.emitter.emit(Event::RunQuery { tab_id: handle.id() });
        Ok(handle)
    }

    // ========== Monitoring ==========

    /// Add a unit to a monitoring dashboard: a grid plus a refresh loop that
    /// runs until the tab closes.
    pub fn start_monitor_unit(&self, tab_id: TabId, unit_id: i64, every: Duration) -> Result<(), ClientError> {
        let mut handles = self.handles.write();
        let handle = handles
            .get_mut(&tab_id)
            .filter(|h| h.tab.mode == TabMode::MonitorDashboard)
            .ok_or_else(|| ClientError::invalid_state(format!("Tab {tab_id} is not a monitoring dashboard")))?;
        if handle.monitor_units.contains_key(&unit_id) {
            return Ok(());
        }
        let (Some(workspace_id), Some(connection_id)) = (handle.tab.parent_id, handle.tab.meta.connection_id) else {
            return Err(ClientError::invalid_state("Monitoring dashboard has no connection"));
        };

        handle.widgets.push(Arc::from(self.widgets.grid(tab_id)));
        let token = CancellationToken::new();
        handle.monitor_units.insert(unit_id, token.clone());
        drop(handles);

        let api = self.api.scoped(connection_id, workspace_id);
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!(unit_id, "Monitor unit stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match api.post_json(MONITOR_REFRESH_PATH, json!({ "ids": [unit_id] })).await {
                            Ok(_) => tracing::trace!(unit_id, "Monitor unit refreshed"),
                            Err(e) => {
                                tracing::warn!(unit_id, error = %e, "Monitor unit refresh failed");
                                api.api().reporter().handle_error(&e);
                                break;
                            }
                        }
                    }
                }
            }
        });
        tracing::debug!(tab_id = %tab_id, unit_id, "Monitor unit started");
        Ok(())
    }

    // ========== Closing ==========

    /// Close a tab.
    ///
    /// Asks before discarding unsaved edits. Widgets of nested tabs and of
    /// the tab itself are destroyed before the tab is removed from the store;
    /// released sessions are then reported in one batch. Returns `false` when
    /// the tab cannot be closed or the user kept it.
    pub async fn close_tab(&self, tab_id: TabId) -> Result<bool, ClientError> {
        let tab = self
            .tabs
            .get_tab(tab_id)
            .ok_or_else(|| ClientError::invalid_state(format!("Tab {tab_id} not found")))?;
        if !tab.closable {
            return Ok(false);
        }

        if tab.has_unsaved_changes() {
            let request = ConfirmRequest::new("Unsaved changes", DISCARD_TAB_MESSAGE).confirm_label("Discard");
            if self.api.reporter().notifier().confirm(request).await.is_none() {
                tracing::debug!(tab_id = %tab_id, "Close cancelled by user");
                return Ok(false);
            }
        }

        for child in &tab.children {
            self.teardown(child.id);
        }
        self.teardown(tab.id);
        self.tabs.remove_tab(tab_id)?;

        let entries = release_entries(&tab);
        if !entries.is_empty() {
            if let Err(e) = self.api.close_tabs(&entries).await {
                tracing::warn!(tab_id = %tab_id, error = %e, "Releasing tab sessions failed");
                self.api.reporter().handle_error(&e);
            }
        }

        tracing::info!(tab_id = %tab_id, mode = tab.mode.as_str(), released = entries.len(), "Tab closed");
        self.emitter.emit(Event::TabClosed { tab_id, workspace_id: tab.parent_id });
        Ok(true)
    }

    fn teardown(&self, tab_id: TabId) {
        let handle = self.handles.write().remove(&tab_id);
        if let Some(handle) = handle {
            tracing::trace!(tab_id = %tab_id, widgets = handle.widgets.len(), "Destroying widgets");
            handle.teardown();
        }
    }
}

impl std::fmt::Debug for TabFactories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabFactories").field("open_handles", &self.open_handles()).finish_non_exhaustive()
    }
}
