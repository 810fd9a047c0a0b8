//! Client configuration and data directory resolution.
//!
//! Configuration is read from `<data_dir>/config.json` when present and then
//! overridden by environment variables:
//!
//! - `PGMANAGE_URL` - base URL of the PgManage server
//! - `PGMANAGE_CSRF_TOKEN` - CSRF token sent with state-changing requests
//! - `PGMANAGE_LOG` - log filter (also read by [`crate::logging`])

use crate::error::ClientError;
use crate::logging::LogConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Order in which queued database switches are taken when several are waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainOrder {
    /// Most recently queued request first.
    #[default]
    Lifo,
    /// Oldest queued request first.
    Fifo,
}

/// Runtime configuration for the client core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Name of the cookie holding the CSRF token
    pub csrf_cookie_name: String,
    /// CSRF token value, if already known
    pub csrf_token: Option<String>,
    /// Interval between keep-alive pings in seconds
    pub keep_alive_interval_secs: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Minimum age of a tree node before a non-forced refresh refetches it
    pub node_refresh_throttle_secs: i64,
    /// Debounce window for properties fetches in milliseconds
    pub properties_debounce_ms: u64,
    /// Take order for queued database switches
    pub switch_drain_order: DrainOrder,
    /// Custom log filter
    pub log_filter: Option<String>,
    /// Write log files when not attached to a terminal
    pub log_to_file: bool,
    /// Application data directory (logs, config)
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            csrf_cookie_name: "pgmanage_csrftoken".to_string(),
            csrf_token: None,
            keep_alive_interval_secs: 60,
            request_timeout_secs: 30,
            node_refresh_throttle_secs: 60,
            properties_debounce_ms: 200,
            switch_drain_order: DrainOrder::default(),
            log_filter: None,
            log_to_file: true,
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the default data directory and environment.
    pub fn load() -> Result<Self, ClientError> {
        Self::load_from(&default_data_dir())
    }

    /// Load configuration from a data directory and apply environment overrides.
    pub fn load_from(data_dir: &Path) -> Result<Self, ClientError> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<ClientConfig>(&raw).map_err(|e| {
                ClientError::config(format!("Invalid config file '{}': {e}", path.display()))
            })?
        } else {
            ClientConfig::default()
        };

        if config.data_dir.is_none() {
            config.data_dir = Some(data_dir.to_path_buf());
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        tracing::debug!(base_url = %config.base_url, "Client configuration loaded");
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PGMANAGE_URL") {
            self.base_url = url;
        }
        if let Some(token) = lookup("PGMANAGE_CSRF_TOKEN") {
            self.csrf_token = Some(token);
        }
        if let Some(filter) = lookup("PGMANAGE_LOG") {
            self.log_filter = Some(filter);
        }
    }

    /// Reject values that would make the client misbehave.
    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.keep_alive_interval_secs == 0 {
            return Err(ClientError::config("keep_alive_interval_secs must be greater than 0"));
        }
        if self.node_refresh_throttle_secs < 0 {
            return Err(ClientError::config("node_refresh_throttle_secs cannot be negative"));
        }
        Ok(())
    }

    /// Keep-alive interval as a duration.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Properties debounce window as a duration.
    pub fn properties_debounce(&self) -> Duration {
        Duration::from_millis(self.properties_debounce_ms)
    }

    /// Node refresh throttle as a chrono duration.
    pub fn node_refresh_throttle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.node_refresh_throttle_secs)
    }

    /// Logging setup for this configuration.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            log_dir: self.data_dir().join("logs"),
            file: self.log_to_file,
            terminal: atty::is(atty::Stream::Stdout),
            filter: self.log_filter.clone(),
        }
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// Get the default data directory for the application.
///
/// Debug builds use `./pgmanage_data` in the current directory.
pub fn default_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from("./pgmanage_data")
    }

    #[cfg(not(debug_assertions))]
    {
        dirs::data_dir()
            .map(|d| d.join("pgmanage"))
            .unwrap_or_else(|| PathBuf::from("./pgmanage_data"))
    }
}

/// Initialize the data directory, creating it if needed.
pub fn init_data_dir(path: &Path) -> Result<(), ClientError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(ClientError::storage(
                format!("Data path exists but is not a directory: {}", path.display()),
                Some("Select a different location or remove the existing file"),
            ));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        ClientError::storage(
            format!("Failed to create data directory '{}': {}", path.display(), e),
            Some("Check permissions on the parent directory"),
        )
    })?;

    tracing::info!(path = %path.display(), "Created data directory");
    Ok(())
}
