//! Data models for the PgManage client core.
//!
//! This module contains all core data structures:
//! - `connection` - Connection, Technology, ChangeDatabaseRequest
//! - `tab` - Tab, TabMode, TabMeta
//! - `tree` - TreeNode, NodeData, NodeState
//! - `settings` - Settings, Shortcut
//! - `metadata` - DatabaseMeta, SchemaMeta
//! - `snippet` - Snippet tree and file manager entries

pub mod connection;
pub mod metadata;
pub mod settings;
pub mod snippet;
pub mod tab;
pub mod tree;

pub use connection::{
    ChangeDatabaseRequest, Connection, ConnectionGroup, ConnectionId, ConnectionList,
    ConnectionUpdate, Technology, TunnelParams,
};
pub use metadata::{DatabaseMeta, RelationMeta, SchemaMeta};
pub use settings::{Settings, Shortcut, Theme};
pub use snippet::{FileEntry, FileKind, Snippet, SnippetFolder};
pub use tab::{NewTab, Tab, TabId, TabMeta, TabMode};
pub use tree::{NodeData, NodePath, NodeState, TreeNode, SPINNER_ICON};
