//! Database-object tree nodes.
//!
//! A node is addressed by its position: the ordered child indices from the
//! root list down to the node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Positional address of a node, e.g. `[0, 2, 1]`.
pub type NodePath = Vec<usize>;

/// Icon carried by the loading placeholder child.
pub const SPINNER_ICON: &str = "node-spin";

/// Per-node data bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeData {
    /// Object type, e.g. `database_list`, `table`
    #[serde(rename = "type")]
    pub node_type: String,
    /// Key of the context menu shown for this node
    #[serde(rename = "contextMenu", alias = "context_menu")]
    pub context_menu: Option<String>,
    /// Database this node belongs to
    pub database: Option<String>,
    /// Schema this node belongs to
    pub schema: Option<String>,
    /// Disambiguator appended to the title, e.g. a table's owner or a function signature
    pub unique: Option<String>,
    /// Pinned to the top of its siblings
    pub pinned: bool,
    /// When children were last requested
    pub last_update: Option<DateTime<Utc>>,
    /// Sequence number of the latest children request issued for this node
    #[serde(skip)]
    pub request_seq: u64,
    /// Backend-specific extra fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Derived load/expansion state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never loaded and not expanded
    CollapsedUnloaded,
    /// Children retained but hidden
    CollapsedLoaded,
    /// Children visible
    Expanded,
    /// Children request outstanding, spinner shown
    Loading,
}

/// A node in the object tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Display title
    pub title: String,
    /// Leaves never have children
    #[serde(rename = "isLeaf", alias = "is_leaf", default)]
    pub is_leaf: bool,
    /// Children visible
    #[serde(rename = "isExpanded", alias = "is_expanded", default)]
    pub is_expanded: bool,
    /// Children fetched at least once
    #[serde(skip)]
    pub children_loaded: bool,
    /// Icon class
    #[serde(default)]
    pub icon: Option<String>,
    /// Data bag
    #[serde(default)]
    pub data: NodeData,
    /// Children
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Create an expandable node of the given type.
    pub fn new(title: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            is_leaf: false,
            is_expanded: false,
            children_loaded: false,
            icon: None,
            data: NodeData { node_type: node_type.into(), ..Default::default() },
            children: Vec::new(),
        }
    }

    /// Create a leaf node of the given type.
    pub fn leaf(title: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self { is_leaf: true, ..Self::new(title, node_type) }
    }

    /// The loading placeholder.
    pub fn spinner() -> Self {
        Self { icon: Some(SPINNER_ICON.to_string()), ..Self::leaf("", "spinner") }
    }

    /// Set the context menu key.
    pub fn with_context_menu(mut self, key: impl Into<String>) -> Self {
        self.data.context_menu = Some(key.into());
        self
    }

    /// Set the owning database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.data.database = Some(database.into());
        self
    }

    /// Whether this is the loading placeholder.
    pub fn is_spinner(&self) -> bool {
        self.icon.as_deref() == Some(SPINNER_ICON)
    }

    /// Derived state.
    pub fn state(&self) -> NodeState {
        if self.children.iter().any(TreeNode::is_spinner) {
            NodeState::Loading
        } else if self.is_expanded {
            NodeState::Expanded
        } else if self.children_loaded {
            NodeState::CollapsedLoaded
        } else {
            NodeState::CollapsedUnloaded
        }
    }

    /// Title with the uniqueness suffix, used when several siblings share a name.
    pub fn format_title(&self) -> String {
        match self.data.unique.as_deref() {
            Some(unique) if !unique.is_empty() => format!("{} ({})", self.title, unique),
            _ => self.title.clone(),
        }
    }
}
