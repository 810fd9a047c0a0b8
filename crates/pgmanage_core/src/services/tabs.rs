//! Tabs store: the single owner of open workspaces and their secondary tabs.

use parking_lot::RwLock;

use crate::error::ClientError;
use crate::models::{Connection, ConnectionId, NewTab, Tab, TabId, TabMeta, TabMode};

/// Title of the "+" placeholder tab.
pub const PLACEHOLDER_TITLE: &str = "+";

#[derive(Debug, Default)]
struct TabsState {
    tabs: Vec<Tab>,
    selected: Option<TabId>,
}

impl TabsState {
    fn find(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find_map(|t| if t.id == id { Some(t) } else { t.child(id) })
    }

    fn find_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        for tab in self.tabs.iter_mut() {
            if tab.id == id {
                return Some(tab);
            }
            if let Some(child) = tab.children.iter_mut().find(|c| c.id == id) {
                return Some(child);
            }
        }
        None
    }

    fn workspace_mut(&mut self, id: TabId) -> Result<&mut Tab, ClientError> {
        self.tabs
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ClientError::invalid_state(format!("Workspace {id} not found")))
    }

    /// Sibling list and selected id of the scope a tab lives in.
    fn scope_mut(&mut self, parent_id: Option<TabId>) -> Result<(&mut Vec<Tab>, &mut Option<TabId>), ClientError> {
        match parent_id {
            None => Ok((&mut self.tabs, &mut self.selected)),
            Some(parent) => {
                let ws = self.workspace_mut(parent)?;
                Ok((&mut ws.children, &mut ws.selected_child))
            }
        }
    }
}

/// Store of open tabs.
#[derive(Debug, Default)]
pub struct TabsStore {
    state: RwLock<TabsState>,
}

impl TabsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Queries ==========

    /// Snapshot of the root tabs, each with its nested tabs.
    pub fn tabs(&self) -> Vec<Tab> {
        self.state.read().tabs.clone()
    }

    /// Any tab by id.
    pub fn get_tab(&self, id: TabId) -> Option<Tab> {
        self.state.read().find(id).cloned()
    }

    /// Workspace by id.
    pub fn get_primary_tab_by_id(&self, id: TabId) -> Option<Tab> {
        self.state.read().tabs.iter().find(|t| t.id == id).cloned()
    }

    /// Secondary tab by id within one workspace. A miss returns `None`.
    pub fn get_secondary_tab_by_id(&self, tab_id: TabId, workspace_id: TabId) -> Option<Tab> {
        let state = self.state.read();
        state.tabs.iter().find(|t| t.id == workspace_id).and_then(|ws| ws.child(tab_id)).cloned()
    }

    /// Selected workspace.
    pub fn selected_primary_tab(&self) -> Option<Tab> {
        let state = self.state.read();
        state.selected.and_then(|id| state.tabs.iter().find(|t| t.id == id)).cloned()
    }

    /// Selected secondary tab of a workspace.
    pub fn selected_secondary_tab(&self, workspace_id: TabId) -> Option<Tab> {
        let state = self.state.read();
        state.tabs.iter().find(|t| t.id == workspace_id).and_then(Tab::selected).cloned()
    }

    /// Workspace opened for a connection, if any.
    pub fn workspace_for_connection(&self, connection_id: ConnectionId) -> Option<Tab> {
        self.state
            .read()
            .tabs
            .iter()
            .find(|t| t.mode == TabMode::Connection && t.meta.connection_id == Some(connection_id))
            .cloned()
    }

    /// True if any open tab reports unsaved edits.
    pub fn has_any_unsaved_changes(&self) -> bool {
        self.state.read().tabs.iter().any(Tab::has_unsaved_changes)
    }

    // ========== Mutations ==========

    /// Create a tab and append it to the root or to its workspace.
    pub fn add_tab(&self, new_tab: NewTab) -> Result<Tab, ClientError> {
        let mut state = self.state.write();
        let tab = new_tab.build();
        let (siblings, _) = state.scope_mut(tab.parent_id)?;
        siblings.push(tab.clone());
        tracing::debug!(tab_id = %tab.id, mode = tab.mode.as_str(), parent_id = ?tab.parent_id, "Tab added");
        Ok(tab)
    }

    /// Mark a tab as the active one within its siblings. Non-selectable tabs
    /// are ignored and `false` is returned.
    pub fn select_tab(&self, id: TabId) -> Result<bool, ClientError> {
        let mut state = self.state.write();
        let (parent_id, selectable) = state
            .find(id)
            .map(|t| (t.parent_id, t.selectable))
            .ok_or_else(|| ClientError::invalid_state(format!("Tab {id} not found")))?;
        if !selectable {
            return Ok(false);
        }
        let (_, selected) = state.scope_mut(parent_id)?;
        *selected = Some(id);
        tracing::trace!(tab_id = %id, "Tab selected");
        Ok(true)
    }

    /// Remove a tab and its nested tabs. When the removed tab was selected,
    /// the selection moves to the nearest selectable sibling.
    pub fn remove_tab(&self, id: TabId) -> Result<Tab, ClientError> {
        let mut state = self.state.write();
        let parent_id = state
            .find(id)
            .map(|t| t.parent_id)
            .ok_or_else(|| ClientError::invalid_state(format!("Tab {id} not found")))?;
        let (siblings, selected) = state.scope_mut(parent_id)?;
        let index = siblings
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| ClientError::internal("Tab scope out of sync"))?;
        let removed = siblings.remove(index);

        if *selected == Some(id) {
            *selected = siblings[index..]
                .iter()
                .find(|t| t.selectable)
                .or_else(|| siblings[..index].iter().rev().find(|t| t.selectable))
                .map(|t| t.id);
        }

        tracing::debug!(tab_id = %id, mode = removed.mode.as_str(), "Tab removed");
        Ok(removed)
    }

    /// Move a tab to another position among its siblings.
    pub fn move_tab(&self, id: TabId, to: usize) -> Result<(), ClientError> {
        let mut state = self.state.write();
        let parent_id = state
            .find(id)
            .map(|t| t.parent_id)
            .ok_or_else(|| ClientError::invalid_state(format!("Tab {id} not found")))?;
        let (siblings, _) = state.scope_mut(parent_id)?;
        let Some(from) = siblings.iter().position(|t| t.id == id) else {
            return Ok(());
        };
        if to >= siblings.len() || from == to || !siblings[from].draggable {
            return Ok(());
        }
        let tab = siblings.remove(from);
        siblings.insert(to, tab);
        Ok(())
    }

    /// Select the next selectable tab in a scope (wraps around).
    pub fn select_next_tab(&self, parent_id: Option<TabId>) -> Result<Option<TabId>, ClientError> {
        self.cycle_selection(parent_id, 1)
    }

    /// Select the previous selectable tab in a scope (wraps around).
    pub fn select_previous_tab(&self, parent_id: Option<TabId>) -> Result<Option<TabId>, ClientError> {
        self.cycle_selection(parent_id, -1)
    }

    fn cycle_selection(&self, parent_id: Option<TabId>, step: isize) -> Result<Option<TabId>, ClientError> {
        let mut state = self.state.write();
        let (siblings, selected) = state.scope_mut(parent_id)?;
        let candidates: Vec<TabId> = siblings.iter().filter(|t| t.selectable).map(|t| t.id).collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        let len = candidates.len() as isize;
        let current = selected.and_then(|id| candidates.iter().position(|c| *c == id));
        let next = match current {
            Some(pos) => (pos as isize + step).rem_euclid(len) as usize,
            None if step > 0 => 0,
            None => candidates.len() - 1,
        };
        *selected = Some(candidates[next]);
        Ok(*selected)
    }

    /// Edit a tab's mode-specific state.
    pub fn update_meta(&self, id: TabId, f: impl FnOnce(&mut TabMeta)) -> Result<(), ClientError> {
        let mut state = self.state.write();
        let tab = state
            .find_mut(id)
            .ok_or_else(|| ClientError::invalid_state(format!("Tab {id} not found")))?;
        f(&mut tab.meta);
        Ok(())
    }

    /// Set a tab's unsaved flag.
    pub fn set_unsaved(&self, id: TabId, unsaved: bool) -> Result<(), ClientError> {
        self.update_meta(id, |meta| meta.has_unsaved_changes = unsaved)
    }

    /// Rename a tab.
    pub fn rename_tab(&self, id: TabId, name: impl Into<String>) -> Result<(), ClientError> {
        let mut state = self.state.write();
        let tab = state
            .find_mut(id)
            .ok_or_else(|| ClientError::invalid_state(format!("Tab {id} not found")))?;
        tab.name = name.into();
        Ok(())
    }

    // ========== Placeholder ==========

    /// Append the "+" tab to a scope unless it is already there.
    pub fn add_placeholder_tab(&self, parent_id: Option<TabId>) -> Result<(), ClientError> {
        let mut state = self.state.write();
        let (siblings, _) = state.scope_mut(parent_id)?;
        if siblings.iter().any(|t| t.mode == TabMode::Add) {
            return Ok(());
        }
        let mut placeholder = NewTab::new(PLACEHOLDER_TITLE, TabMode::Add).pinned().unselectable();
        placeholder.parent_id = parent_id;
        siblings.push(placeholder.build());
        Ok(())
    }

    /// Remove the "+" tab from a scope.
    pub fn remove_placeholder_tab(&self, parent_id: Option<TabId>) -> Result<(), ClientError> {
        let mut state = self.state.write();
        let (siblings, _) = state.scope_mut(parent_id)?;
        siblings.retain(|t| t.mode != TabMode::Add);
        Ok(())
    }

    // ========== Convenience constructors ==========

    /// Open a workspace for a database connection and select it.
    pub fn create_connection_tab(&self, connection: &Connection) -> Result<Tab, ClientError> {
        let meta = TabMeta {
            connection_id: Some(connection.id),
            technology: Some(connection.technology),
            selected_database: connection.initial_database().map(String::from),
            ..Default::default()
        };
        let tooltip = connection.terminal_details();
        let tab = self.add_tab(NewTab::new(&connection.alias, TabMode::Connection).tooltip(tooltip).meta(meta))?;
        self.select_tab(tab.id)?;
        Ok(tab)
    }

    /// Open a terminal workspace and select it.
    pub fn create_terminal_tab(
        &self,
        connection_id: ConnectionId,
        alias: &str,
        details: &str,
    ) -> Result<Tab, ClientError> {
        let meta = TabMeta {
            connection_id: Some(connection_id),
            terminal_details: Some(details.to_string()),
            ..Default::default()
        };
        let tab = self.add_tab(NewTab::new(alias, TabMode::Terminal).tooltip(details).meta(meta))?;
        self.select_tab(tab.id)?;
        Ok(tab)
    }

    /// Open the snippet panel, or return the one already open.
    pub fn create_snippet_panel(&self) -> Result<Tab, ClientError> {
        if let Some(existing) = self.state.read().tabs.iter().find(|t| t.mode == TabMode::Snippets) {
            return Ok(existing.clone());
        }
        self.add_tab(NewTab::new("Snippets", TabMode::Snippets).pinned())
    }

    fn create_secondary(&self, workspace_id: TabId, new_tab: NewTab) -> Result<Tab, ClientError> {
        let inherited = {
            let state = self.state.read();
            let ws = state
                .tabs
                .iter()
                .find(|t| t.id == workspace_id)
                .ok_or_else(|| ClientError::invalid_state(format!("Workspace {workspace_id} not found")))?;
            (ws.meta.connection_id, ws.meta.technology, ws.meta.selected_database.clone())
        };
        let mut new_tab = new_tab.in_workspace(workspace_id);
        new_tab.meta.connection_id = new_tab.meta.connection_id.or(inherited.0);
        new_tab.meta.technology = new_tab.meta.technology.or(inherited.1);
        if new_tab.meta.selected_database.is_none() {
            new_tab.meta.selected_database = inherited.2;
        }
        let tab = self.add_tab(new_tab)?;
        self.select_tab(tab.id)?;
        Ok(tab)
    }

    /// Open a query tab in a workspace.
    pub fn create_query_tab(
        &self,
        workspace_id: TabId,
        name: &str,
        tab_db_id: Option<i64>,
        initial_text: Option<String>,
    ) -> Result<Tab, ClientError> {
        let meta = TabMeta { tab_db_id, initial_text, ..Default::default() };
        self.create_secondary(workspace_id, NewTab::new(name, TabMode::Query).meta(meta))
    }

    /// Open a console tab in a workspace.
    pub fn create_console_tab(&self, workspace_id: TabId) -> Result<Tab, ClientError> {
        self.create_secondary(workspace_id, NewTab::new("Console", TabMode::Console))
    }

    /// Open a monitoring dashboard in a workspace.
    pub fn create_monitor_dashboard_tab(&self, workspace_id: TabId) -> Result<Tab, ClientError> {
        self.create_secondary(workspace_id, NewTab::new("Monitoring", TabMode::MonitorDashboard))
    }

    /// Open the server configuration editor in a workspace.
    pub fn create_config_tab(&self, workspace_id: TabId) -> Result<Tab, ClientError> {
        self.create_secondary(workspace_id, NewTab::new("Configuration", TabMode::Config))
    }

    /// Open a snippet editor in the snippet panel.
    pub fn create_snippet_tab(
        &self,
        snippet_id: Option<i64>,
        name: &str,
        text: Option<String>,
    ) -> Result<Tab, ClientError> {
        let panel = self.create_snippet_panel()?;
        let meta = TabMeta { snippet_id, initial_text: text, ..Default::default() };
        self.create_secondary(panel.id, NewTab::new(name, TabMode::Snippet).meta(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Technology;

    fn connection() -> Connection {
        let mut conn = Connection::new(1, "prod", Technology::Postgresql);
        conn.service = "app".into();
        conn
    }

    #[test]
    fn test_connection_tab_is_selected_workspace() {
        let store = TabsStore::new();
        let tab = store.create_connection_tab(&connection()).unwrap();

        assert!(tab.is_workspace());
        assert_eq!(tab.meta.selected_database.as_deref(), Some("app"));
        assert_eq!(store.selected_primary_tab().map(|t| t.id), Some(tab.id));
        assert_eq!(store.workspace_for_connection(1).map(|t| t.id), Some(tab.id));
    }

    #[test]
    fn test_secondary_tabs_inherit_workspace_context() {
        let store = TabsStore::new();
        let ws = store.create_connection_tab(&connection()).unwrap();
        let query = store.create_query_tab(ws.id, "Query", Some(12), Some("select 1".into())).unwrap();

        assert_eq!(query.parent_id, Some(ws.id));
        assert_eq!(query.meta.connection_id, Some(1));
        assert_eq!(query.meta.selected_database.as_deref(), Some("app"));
        assert_eq!(store.selected_secondary_tab(ws.id).map(|t| t.id), Some(query.id));
        assert!(store.get_secondary_tab_by_id(query.id, ws.id).is_some());
    }

    #[test]
    fn test_secondary_lookup_is_scoped_and_silent() {
        let store = TabsStore::new();
        let ws_a = store.create_connection_tab(&connection()).unwrap();
        let ws_b = store.create_terminal_tab(2, "bastion", "root@h:22").unwrap();
        let query = store.create_query_tab(ws_a.id, "Query", None, None).unwrap();

        assert!(store.get_secondary_tab_by_id(query.id, ws_b.id).is_none());
        assert!(store.get_secondary_tab_by_id(uuid::Uuid::new_v4(), ws_a.id).is_none());
    }

    #[test]
    fn test_select_does_not_touch_other_scopes() {
        let store = TabsStore::new();
        let ws_a = store.create_connection_tab(&connection()).unwrap();
        let q1 = store.create_query_tab(ws_a.id, "Q1", None, None).unwrap();
        let ws_b = store.create_terminal_tab(2, "bastion", "root@h:22").unwrap();

        assert_eq!(store.selected_primary_tab().map(|t| t.id), Some(ws_b.id));
        assert_eq!(store.selected_secondary_tab(ws_a.id).map(|t| t.id), Some(q1.id));
    }

    #[test]
    fn test_placeholder_is_not_selectable() {
        let store = TabsStore::new();
        store.add_placeholder_tab(None).unwrap();
        store.add_placeholder_tab(None).unwrap();
        let tabs = store.tabs();
        assert_eq!(tabs.len(), 1);
        assert!(!store.select_tab(tabs[0].id).unwrap());

        store.remove_placeholder_tab(None).unwrap();
        assert!(store.tabs().is_empty());
    }

    #[test]
    fn test_unsaved_changes_aggregate() {
        let store = TabsStore::new();
        let ws = store.create_connection_tab(&connection()).unwrap();
        let query = store.create_query_tab(ws.id, "Query", None, None).unwrap();
        assert!(!store.has_any_unsaved_changes());

        store.set_unsaved(query.id, true).unwrap();
        assert!(store.has_any_unsaved_changes());
        assert!(store.get_tab(ws.id).unwrap().has_unsaved_changes());

        store.set_unsaved(query.id, false).unwrap();
        assert!(!store.has_any_unsaved_changes());
    }

    #[test]
    fn test_remove_selected_moves_selection() {
        let store = TabsStore::new();
        let ws = store.create_connection_tab(&connection()).unwrap();
        let q1 = store.create_query_tab(ws.id, "Q1", None, None).unwrap();
        let q2 = store.create_query_tab(ws.id, "Q2", None, None).unwrap();
        store.add_placeholder_tab(Some(ws.id)).unwrap();

        store.remove_tab(q2.id).unwrap();
        assert_eq!(store.selected_secondary_tab(ws.id).map(|t| t.id), Some(q1.id));

        store.remove_tab(q1.id).unwrap();
        assert!(store.selected_secondary_tab(ws.id).is_none());
    }

    #[test]
    fn test_cycle_selection_wraps() {
        let store = TabsStore::new();
        let a = store.create_connection_tab(&connection()).unwrap();
        let b = store.create_terminal_tab(2, "b", "u@h:22").unwrap();
        store.add_placeholder_tab(None).unwrap();

        assert_eq!(store.select_next_tab(None).unwrap(), Some(a.id));
        assert_eq!(store.select_previous_tab(None).unwrap(), Some(b.id));
    }

    #[test]
    fn test_move_tab() {
        let store = TabsStore::new();
        let a = store.create_connection_tab(&connection()).unwrap();
        let b = store.create_terminal_tab(2, "b", "u@h:22").unwrap();
        store.move_tab(b.id, 0).unwrap();
        let ids: Vec<_> = store.tabs().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn test_snippet_panel_is_singleton() {
        let store = TabsStore::new();
        let panel = store.create_snippet_panel().unwrap();
        let tab = store.create_snippet_tab(Some(4), "vacuum.sql", Some("vacuum;".into())).unwrap();
        assert_eq!(tab.parent_id, Some(panel.id));
        assert_eq!(store.create_snippet_panel().unwrap().id, panel.id);
        assert!(!panel.closable);
    }
}
