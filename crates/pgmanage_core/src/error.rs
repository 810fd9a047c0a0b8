//! Error types for the PgManage client core.
//!
//! Every failure that reaches the user ends in one of three presentations:
//! a blocking alert, a transient toast, or a credential prompt.

use thiserror::Error;

/// Which credential expired when the backend reports a password timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordKind {
    /// Database login password
    #[default]
    Database,
    /// SSH tunnel password
    Ssh,
}

impl PasswordKind {
    /// Convert to string representation used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Ssh => "ssh",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ssh" | "tunnel" => Self::Ssh,
            _ => Self::Database,
        }
    }
}

/// Main error type for the client core.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The session is not authenticated (HTTP 401).
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// The backend could not be reached.
    #[error("Network error: {message}")]
    Network {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The stored credential for a connection expired and must be re-entered.
    #[error("{message}")]
    PasswordTimeout {
        /// Message supplied by the backend.
        message: String,
        /// Which credential must be renewed.
        kind: PasswordKind,
    },

    /// The backend rejected the request.
    #[error("{message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Message supplied by the backend.
        message: String,
    },

    /// A request or response body could not be (de)serialized.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Local file or directory error.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// An operation referred to a tab, node or connection that does not exist
    /// or is not in a state that allows the operation.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Human-readable error message.
        message: String,
    },

    /// Input rejected before it was sent to the backend.
    #[error("{message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

/// How an error is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Blocking global alert.
    Alert,
    /// Transient toast with the message.
    Toast,
    /// Credential re-entry prompt.
    PasswordPrompt,
}

impl ClientError {
    // ========== Constructors ==========

    /// Create a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication { message: message.into() }
    }

    /// Create a new network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into(), source: None }
    }

    /// Create a new network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new password timeout error.
    pub fn password_timeout(message: impl Into<String>, kind: PasswordKind) -> Self {
        Self::PasswordTimeout { message: message.into(), kind }
    }

    /// Create a new backend error.
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend { status, message: message.into() }
    }

    /// Create a new serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Create a new storage error.
    pub fn storage(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Storage { message: message.into(), hint: hint.map(String::from), source: None }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Methods ==========

    /// Check if this error asks for credential re-entry.
    pub fn is_password_timeout(&self) -> bool {
        matches!(self, Self::PasswordTimeout { .. })
    }

    /// Check if this error is an authentication failure.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Check if this error is a network failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "Authentication",
            Self::Network { .. } => "Network",
            Self::PasswordTimeout { .. } => "Password",
            Self::Backend { .. } => "Server",
            Self::Serialization { .. } => "Serialization",
            Self::Storage { .. } => "Storage",
            Self::Config { .. } => "Config",
            Self::InvalidState { .. } => "State",
            Self::Validation { .. } => "Validation",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Authentication { .. } => Some("Reload the page and sign in again"),
            Self::Network { .. } => Some("Try reloading the application if the issue persists"),
            Self::PasswordTimeout { .. } => Some("Re-enter the password to continue"),
            Self::Storage { hint, .. } => hint.as_deref(),
            Self::Internal { .. } => Some("Please report this issue"),
            _ => None,
        }
    }

    /// How this error is shown to the user.
    pub fn presentation(&self) -> Presentation {
        match self {
            Self::Authentication { .. } | Self::Network { .. } => Presentation::Alert,
            Self::PasswordTimeout { .. } => Presentation::PasswordPrompt,
            _ => Presentation::Toast,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Backend { status, .. } => Some(format!("HTTP status: {status}")),
            Self::PasswordTimeout { kind, .. } => Some(format!("Credential: {}", kind.as_str())),
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Server Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for "Show Details" expansion.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from reqwest::Error to ClientError.
impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status.as_u16() == 401 {
                return ClientError::authentication("User not authenticated");
            }
            return ClientError::backend(status.as_u16(), err.to_string());
        }

        if err.is_decode() {
            return ClientError::Serialization {
                message: err.to_string(),
                source: Some(Box::new(err)),
            };
        }

        ClientError::Network { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from serde_json::Error to ClientError.
impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization {
            message: format!("JSON error: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from std::io::Error to ClientError.
impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage {
            message: err.to_string(),
            hint: Some("Check file permissions and disk space".to_string()),
            source: Some(Box::new(err)),
        }
    }
}
