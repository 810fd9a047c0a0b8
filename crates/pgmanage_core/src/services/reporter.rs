//! Error presentation and user prompts.
//!
//! The UI shell implements [`Notifier`]; the core never renders anything
//! itself. [`ErrorReporter`] decides which presentation a failure gets.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ClientError, PasswordKind, Presentation};
use crate::models::ConnectionId;

/// Alert shown when the session is no longer authenticated.
pub const AUTH_ALERT_MESSAGE: &str = "User not authenticated, please reload the page.";

/// Alert text for a network failure.
pub fn network_alert_message(message: &str) -> String {
    format!("{message}. Try reloading the application if the issue persists.")
}

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    /// Operation succeeded
    Success,
    /// Informational
    Info,
    /// Something needs attention
    Warning,
    /// Operation failed
    Error,
}

/// A checkbox offered in a confirmation dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmOption {
    /// Label, also the value returned when checked
    pub label: String,
    /// Initial state
    pub checked: bool,
}

/// A blocking yes/no question, optionally with checkboxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    /// Dialog title
    pub title: String,
    /// Question text
    pub message: String,
    /// Label of the confirming button
    pub confirm_label: String,
    /// Checkboxes shown below the message
    pub options: Vec<ConfirmOption>,
}

impl ConfirmRequest {
    /// Question without options.
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            confirm_label: "Yes".to_string(),
            options: Vec::new(),
        }
    }

    /// Set the confirming button label.
    pub fn confirm_label(mut self, label: impl Into<String>) -> Self {
        self.confirm_label = label.into();
        self
    }

    /// Add unchecked checkboxes.
    pub fn with_options<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .extend(labels.into_iter().map(|l| ConfirmOption { label: l.into(), checked: false }));
        self
    }
}

/// The user's answer to a confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmResponse {
    /// Labels of the checked options
    pub checked: Vec<String>,
}

impl ConfirmResponse {
    /// Whether an option was checked.
    pub fn is_checked(&self, label: &str) -> bool {
        self.checked.iter().any(|c| c == label)
    }
}

/// Request to re-enter an expired credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPrompt {
    /// Connection whose credential expired
    pub database_index: ConnectionId,
    /// Which credential
    pub kind: PasswordKind,
    /// Message from the backend
    pub message: String,
}

/// User-facing surface implemented by the UI shell.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Blocking global alert.
    fn alert(&self, message: &str);

    /// Transient toast.
    fn toast(&self, level: ToastLevel, message: &str);

    /// Ask for confirmation. `None` means the user declined.
    async fn confirm(&self, request: ConfirmRequest) -> Option<ConfirmResponse>;

    /// Ask for a password. `None` means the user cancelled.
    async fn prompt_password(&self, prompt: PasswordPrompt) -> Option<String>;
}

/// Notifier for headless runs: everything goes to the log, questions are declined.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    fn alert(&self, message: &str) {
        tracing::error!(message, "Alert");
    }

    fn toast(&self, level: ToastLevel, message: &str) {
        match level {
            ToastLevel::Error => tracing::error!(message, "Toast"),
            ToastLevel::Warning => tracing::warn!(message, "Toast"),
            ToastLevel::Success | ToastLevel::Info => tracing::info!(message, "Toast"),
        }
    }

    async fn confirm(&self, request: ConfirmRequest) -> Option<ConfirmResponse> {
        tracing::warn!(title = %request.title, "Confirmation declined in headless mode");
        None
    }

    async fn prompt_password(&self, prompt: PasswordPrompt) -> Option<String> {
        tracing::warn!(
            database_index = prompt.database_index,
            kind = prompt.kind.as_str(),
            "Password prompt cancelled in headless mode"
        );
        None
    }
}

/// Routes failures to the right presentation.
pub struct ErrorReporter {
    notifier: Arc<dyn Notifier>,
    auth_alert_shown: AtomicBool,
}

impl ErrorReporter {
    /// Create a reporter presenting through the given notifier.
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier, auth_alert_shown: AtomicBool::new(false) }
    }

    /// The notifier used for presentation.
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Called for every failed request before the caller sees the error.
    ///
    /// Logs the failure and raises the global alerts. The authentication
    /// alert is shown once; later 401s are suppressed until
    /// [`reset_auth_alert`](Self::reset_auth_alert).
    pub fn intercept(&self, err: &ClientError) {
        tracing::error!(category = err.category(), status = ?err.status(), error = %err, "Request failed");

        match err {
            ClientError::Authentication { .. } => {
                if self.auth_alert_shown.swap(true, Ordering::SeqCst) {
                    tracing::debug!("Authentication alert already shown");
                } else {
                    self.notifier.alert(AUTH_ALERT_MESSAGE);
                }
            }
            ClientError::Network { message, .. } => {
                self.notifier.alert(&network_alert_message(message));
            }
            _ => {}
        }
    }

    /// Call-site handler for an error nobody handles specially.
    ///
    /// Alert-class errors were already presented by [`intercept`](Self::intercept).
    pub fn handle_error(&self, err: &ClientError) {
        match err.presentation() {
            Presentation::Alert => {}
            Presentation::Toast | Presentation::PasswordPrompt => {
                self.notifier.toast(ToastLevel::Error, &err.to_string());
            }
        }
    }

    /// Show a toast.
    pub fn toast(&self, level: ToastLevel, message: &str) {
        self.notifier.toast(level, message);
    }

    /// Allow the authentication alert to be shown again.
    pub fn reset_auth_alert(&self) {
        self.auth_alert_shown.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("auth_alert_shown", &self.auth_alert_shown.load(Ordering::Relaxed))
            .finish()
    }
}
