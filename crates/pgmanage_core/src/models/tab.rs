//! Tab models: workspaces and their nested secondary tabs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connection::{ConnectionId, Technology};

/// Unique tab identifier, also used to scope emitter topics.
pub type TabId = Uuid;

/// Discriminates which factory built a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabMode {
    /// Workspace for a database connection
    Connection,
    /// Workspace for an SSH terminal
    Terminal,
    /// Workspace holding the snippet panel
    Snippets,
    /// SQL query editor
    Query,
    /// Interactive console
    Console,
    /// Monitoring dashboard
    MonitorDashboard,
    /// Server configuration editor
    Config,
    /// Snippet editor
    Snippet,
    /// The trailing "+" placeholder in a tab strip
    Add,
}

impl TabMode {
    /// Convert to string representation used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Terminal => "outer_terminal",
            Self::Snippets => "snippets",
            Self::Query => "query",
            Self::Console => "console",
            Self::MonitorDashboard => "monitor_dashboard",
            Self::Config => "configuration",
            Self::Snippet => "snippet",
            Self::Add => "add",
        }
    }

    /// Whether tabs of this mode live at the root of the tab strip.
    pub fn is_workspace(&self) -> bool {
        matches!(self, Self::Connection | Self::Terminal | Self::Snippets)
    }

    /// Whether closing a tab of this mode must be reported to the backend.
    pub fn holds_backend_session(&self) -> bool {
        matches!(self, Self::Query | Self::Console | Self::Config | Self::MonitorDashboard)
    }
}

/// Mode-specific state carried by a tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabMeta {
    /// Connection the tab works against
    pub connection_id: Option<ConnectionId>,
    /// Database selected in the workspace
    pub selected_database: Option<String>,
    /// Technology of the connection
    pub technology: Option<Technology>,
    /// `user@server:port` for terminal tabs
    pub terminal_details: Option<String>,
    /// Backend query session id of a query tab
    pub tab_db_id: Option<i64>,
    /// Snippet shown by a snippet tab
    pub snippet_id: Option<i64>,
    /// Text placed in the editor when the tab opens
    pub initial_text: Option<String>,
    /// Unsaved edits in this tab
    pub has_unsaved_changes: bool,
}

/// A tab in the strip, either a workspace or a secondary tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    /// Unique id
    pub id: TabId,
    /// Display name
    pub name: String,
    /// Factory discriminator
    pub mode: TabMode,
    /// Can the user close it
    pub closable: bool,
    /// Can the user select it
    pub selectable: bool,
    /// Can the user drag it
    pub draggable: bool,
    /// Hover text
    pub tooltip: Option<String>,
    /// Mode-specific state
    pub meta: TabMeta,
    /// Owning workspace, `None` at the root
    pub parent_id: Option<TabId>,
    /// Nested secondary tabs
    pub children: Vec<Tab>,
    /// Active child tab
    pub selected_child: Option<TabId>,
}

impl Tab {
    /// Whether this tab is a workspace.
    pub fn is_workspace(&self) -> bool {
        self.parent_id.is_none() && self.mode.is_workspace()
    }

    /// Unsaved flag of this tab aggregated with all of its children.
    pub fn has_unsaved_changes(&self) -> bool {
        self.meta.has_unsaved_changes || self.children.iter().any(Tab::has_unsaved_changes)
    }

    /// Direct child by id.
    pub fn child(&self, id: TabId) -> Option<&Tab> {
        self.children.iter().find(|t| t.id == id)
    }

    /// Currently selected child.
    pub fn selected(&self) -> Option<&Tab> {
        self.selected_child.and_then(|id| self.child(id))
    }

    /// Children that are real tabs, excluding the "+" placeholder.
    pub fn secondary_tabs(&self) -> impl Iterator<Item = &Tab> {
        self.children.iter().filter(|t| t.mode != TabMode::Add)
    }
}

/// Description of a tab to create.
#[derive(Debug, Clone)]
pub struct NewTab {
    /// Display name
    pub name: String,
    /// Factory discriminator
    pub mode: TabMode,
    /// Workspace to nest under
    pub parent_id: Option<TabId>,
    /// Can the user close it
    pub closable: bool,
    /// Can the user select it
    pub selectable: bool,
    /// Can the user drag it
    pub draggable: bool,
    /// Hover text
    pub tooltip: Option<String>,
    /// Mode-specific state
    pub meta: TabMeta,
}

impl NewTab {
    /// Start describing a closable, selectable, draggable tab.
    pub fn new(name: impl Into<String>, mode: TabMode) -> Self {
        Self {
            name: name.into(),
            mode,
            parent_id: None,
            closable: true,
            selectable: true,
            draggable: true,
            tooltip: None,
            meta: TabMeta::default(),
        }
    }

    /// Nest the tab under a workspace.
    pub fn in_workspace(mut self, parent_id: TabId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set hover text.
    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    /// Set mode-specific state.
    pub fn meta(mut self, meta: TabMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Prevent the user from closing the tab.
    pub fn pinned(mut self) -> Self {
        self.closable = false;
        self.draggable = false;
        self
    }

    /// Prevent selection, used for the "+" placeholder.
    pub fn unselectable(mut self) -> Self {
        self.selectable = false;
        self
    }

    pub(crate) fn build(self) -> Tab {
        Tab {
            id: Uuid::new_v4(),
            name: self.name,
            mode: self.mode,
            closable: self.closable,
            selectable: self.selectable,
            draggable: self.draggable,
            tooltip: self.tooltip,
            meta: self.meta,
            parent_id: self.parent_id,
            children: Vec::new(),
            selected_child: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsaved_aggregates_children() {
        let mut workspace = NewTab::new("prod", TabMode::Connection).build();
        let mut query = NewTab::new("Query", TabMode::Query).in_workspace(workspace.id).build();
        assert!(!workspace.has_unsaved_changes());

        query.meta.has_unsaved_changes = true;
        workspace.children.push(query);
        assert!(workspace.has_unsaved_changes());
        assert!(!workspace.meta.has_unsaved_changes);
    }

    #[test]
    fn test_workspace_modes() {
        assert!(TabMode::Connection.is_workspace());
        assert!(TabMode::Terminal.is_workspace());
        assert!(!TabMode::Query.is_workspace());
        assert!(TabMode::MonitorDashboard.holds_backend_session());
        assert!(!TabMode::Snippet.holds_backend_session());
    }

    #[test]
    fn test_builder_flags() {
        let tab = NewTab::new("+", TabMode::Add).pinned().unselectable().build();
        assert!(!tab.closable);
        assert!(!tab.selectable);
        assert!(!tab.draggable);
    }
}
