//! Connection models as served by the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tab::TabId;

/// Server-side connection identifier (`database_index` on the wire).
pub type ConnectionId = i64;

/// Database technology a connection points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    /// PostgreSQL
    #[default]
    Postgresql,
    /// MySQL
    Mysql,
    /// MariaDB
    Mariadb,
    /// SQLite
    Sqlite,
    /// Microsoft SQL Server
    Mssql,
    /// Oracle
    Oracle,
    /// Plain SSH terminal session, no database
    Terminal,
}

impl Technology {
    /// Convert to string representation used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Sqlite => "sqlite",
            Self::Mssql => "mssql",
            Self::Oracle => "oracle",
            Self::Terminal => "terminal",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Some(Self::Postgresql),
            "mysql" => Some(Self::Mysql),
            "mariadb" => Some(Self::Mariadb),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mssql" => Some(Self::Mssql),
            "oracle" => Some(Self::Oracle),
            "terminal" => Some(Self::Terminal),
            _ => None,
        }
    }

    /// Whether this connection opens a terminal workspace instead of a database one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

/// SSH tunnel settings attached to a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelParams {
    /// Whether the tunnel is used
    pub enabled: bool,
    /// SSH server host
    pub server: String,
    /// SSH server port
    pub port: String,
    /// SSH user
    pub user: String,
}

/// A configured database or terminal connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Server-assigned identifier
    pub id: ConnectionId,
    /// Display alias
    #[serde(default)]
    pub alias: String,
    /// Database technology
    pub technology: Technology,
    /// Server host
    #[serde(default)]
    pub server: String,
    /// Server port
    #[serde(default)]
    pub port: String,
    /// Initial database (service)
    #[serde(default)]
    pub service: String,
    /// Login user
    #[serde(default)]
    pub user: String,
    /// Full connection string when configured that way
    #[serde(default)]
    pub conn_string: String,
    /// SSH tunnel settings
    #[serde(default)]
    pub tunnel: TunnelParams,
    /// Owning group, if any
    #[serde(default)]
    pub group: Option<i64>,
    /// Whether editor autocomplete is enabled for this connection
    #[serde(default)]
    pub autocomplete: bool,
    /// When the connection was last opened
    #[serde(default)]
    pub last_access_date: Option<DateTime<Utc>>,
    /// Pinned to the top of the connection list
    #[serde(default)]
    pub pinned: bool,
    /// Databases pinned in this connection's tree
    #[serde(default)]
    pub pinned_databases: Vec<String>,
    /// Database selected the last time the connection was used
    #[serde(default)]
    pub last_used_database: Option<String>,
}

impl Connection {
    /// Create a connection with default parameters.
    pub fn new(id: ConnectionId, alias: impl Into<String>, technology: Technology) -> Self {
        Self {
            id,
            alias: alias.into(),
            technology,
            server: String::new(),
            port: String::new(),
            service: String::new(),
            user: String::new(),
            conn_string: String::new(),
            tunnel: TunnelParams::default(),
            group: None,
            autocomplete: true,
            last_access_date: None,
            pinned: false,
            pinned_databases: Vec::new(),
            last_used_database: None,
        }
    }

    /// Details line shown on terminal tabs, `user@server:port`.
    pub fn terminal_details(&self) -> String {
        if self.tunnel.enabled {
            format!("{}@{}:{}", self.tunnel.user, self.tunnel.server, self.tunnel.port)
        } else {
            format!("{}@{}:{}", self.user, self.server, self.port)
        }
    }

    /// Database to select when the workspace opens.
    pub fn initial_database(&self) -> Option<&str> {
        self.last_used_database
            .as_deref()
            .or(if self.service.is_empty() { None } else { Some(self.service.as_str()) })
    }
}

/// Partial in-place update to a connection, as produced by the edit modal.
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpdate {
    /// New alias
    pub alias: Option<String>,
    /// New server host
    pub server: Option<String>,
    /// New port
    pub port: Option<String>,
    /// New initial database
    pub service: Option<String>,
    /// New user
    pub user: Option<String>,
    /// New group
    pub group: Option<Option<i64>>,
    /// New autocomplete flag
    pub autocomplete: Option<bool>,
    /// New pinned flag
    pub pinned: Option<bool>,
    /// New last used database
    pub last_used_database: Option<String>,
}

impl ConnectionUpdate {
    /// Apply the update to a connection.
    pub fn apply(self, conn: &mut Connection) {
        if let Some(alias) = self.alias {
            conn.alias = alias;
        }
        if let Some(server) = self.server {
            conn.server = server;
        }
        if let Some(port) = self.port {
            conn.port = port;
        }
        if let Some(service) = self.service {
            conn.service = service;
        }
        if let Some(user) = self.user {
            conn.user = user;
        }
        if let Some(group) = self.group {
            conn.group = group;
        }
        if let Some(autocomplete) = self.autocomplete {
            conn.autocomplete = autocomplete;
        }
        if let Some(pinned) = self.pinned {
            conn.pinned = pinned;
        }
        if let Some(db) = self.last_used_database {
            conn.last_used_database = Some(db);
        }
    }
}

/// A named group of connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionGroup {
    /// Group identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Member connection ids
    #[serde(default)]
    pub conn_list: Vec<ConnectionId>,
}

/// Response body of `/get_connections/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionList {
    /// Configured connections
    #[serde(default, alias = "v_conn_list")]
    pub connections: Vec<Connection>,
    /// Connection groups
    #[serde(default, alias = "v_group_list")]
    pub groups: Vec<ConnectionGroup>,
}

/// Request to switch the active database of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDatabaseRequest {
    /// Connection the workspace belongs to
    pub database_index: ConnectionId,
    /// Workspace tab id
    pub workspace_id: TabId,
    /// Database to switch to
    pub database: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_details_format() {
        let mut conn = Connection::new(3, "bastion", Technology::Terminal);
        conn.user = "admin".into();
        conn.server = "10.0.0.4".into();
        conn.port = "22".into();
        assert_eq!(conn.terminal_details(), "admin@10.0.0.4:22");
    }

    #[test]
    fn test_technology_parse() {
        assert_eq!(Technology::parse("sqlite3"), Some(Technology::Sqlite));
        assert_eq!(Technology::parse("Terminal"), Some(Technology::Terminal));
        assert_eq!(Technology::parse("db2"), None);
        assert!(Technology::Terminal.is_terminal());
    }

    #[test]
    fn test_connection_deserializes_sparse_payload() {
        let conn: Connection = serde_json::from_str(
            r#"{ "id": 7, "alias": "prod", "technology": "postgresql", "pinned": true }"#,
        )
        .unwrap();
        assert_eq!(conn.id, 7);
        assert!(conn.pinned);
        assert!(conn.last_access_date.is_none());
        assert!(conn.tunnel.server.is_empty());
    }

    #[test]
    fn test_connection_list_accepts_legacy_keys() {
        let list: ConnectionList = serde_json::from_str(
            r#"{ "v_conn_list": [{ "id": 1, "technology": "mysql" }], "v_group_list": [] }"#,
        )
        .unwrap();
        assert_eq!(list.connections.len(), 1);
        assert_eq!(list.connections[0].technology, Technology::Mysql);
    }

    #[test]
    fn test_update_applies_only_set_fields() {
        let mut conn = Connection::new(1, "old", Technology::Postgresql);
        conn.server = "db1".into();
        ConnectionUpdate { alias: Some("new".into()), ..Default::default() }.apply(&mut conn);
        assert_eq!(conn.alias, "new");
        assert_eq!(conn.server, "db1");
    }
}
