//! Session lifecycle: sign-in, master password, keep-alive and unload.

use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::services::api::{Api, SignInOutcome};
use crate::services::reporter::ConfirmRequest;
use crate::services::tabs::TabsStore;

/// Message shown before discarding unsaved tabs.
pub const UNSAVED_CLOSE_MESSAGE: &str =
    "You have unsaved changes in one or more tabs. Do you wish to discard all changes and close?";

/// Minimum master password length.
pub const MIN_MASTER_PASSWORD_LEN: usize = 8;

/// Messages exchanged with an embedding frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMessage {
    /// The host asks whether the client may close
    RequestClose,
    /// The client agrees to close
    ConfirmClose,
}

impl FrameMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestClose => "pgmanage:request-close",
            Self::ConfirmClose => "pgmanage:confirm-close",
        }
    }

    /// Parse a raw message; unknown messages are ignored by callers.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pgmanage:request-close" => Some(Self::RequestClose),
            "pgmanage:confirm-close" => Some(Self::ConfirmClose),
            _ => None,
        }
    }
}

/// Client session bound to one backend.
pub struct Session {
    api: Api,
    tabs: Arc<TabsStore>,
    runtime: tokio::runtime::Handle,
    keep_alive_interval: Duration,
    keep_alive: Mutex<Option<CancellationToken>>,
    user_id: RwLock<Option<i64>>,
}

impl Session {
    pub fn new(
        api: Api,
        tabs: Arc<TabsStore>,
        runtime: tokio::runtime::Handle,
        keep_alive_interval: Duration,
    ) -> Self {
        Self {
            api,
            tabs,
            runtime,
            keep_alive_interval,
            keep_alive: Mutex::new(None),
            user_id: RwLock::new(None),
        }
    }

    /// Signed-in user id.
    pub fn user_id(&self) -> Option<i64> {
        *self.user_id.read()
    }

    // ========== Authentication ==========

    /// Sign in. Rejected credentials come back as a validation error with the
    /// message to show on the login form.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<i64, ClientError> {
        match self.api.sign_in(username, password).await? {
            SignInOutcome::Success(id) => {
                *self.user_id.write() = Some(id);
                // A fresh session may raise the authentication alert again
                self.api.reporter().reset_auth_alert();
                tracing::info!(user_id = id, "Signed in");
                Ok(id)
            }
            SignInOutcome::InvalidToken => Err(ClientError::validation(
                "Invalid authentication token, use pgmanage-server to support multiple users.",
            )),
            SignInOutcome::InvalidCredentials => {
                tracing::warn!(username, "Sign-in rejected");
                Err(ClientError::validation("Invalid username or password."))
            }
        }
    }

    /// Set a new master password after checking it against its confirmation.
    pub async fn set_master_password(&self, password: &str, confirmation: &str) -> Result<(), ClientError> {
        if password != confirmation {
            return Err(ClientError::validation("Password and Confirm Password fields do not match."));
        }
        if !password.is_empty() && password.chars().count() < MIN_MASTER_PASSWORD_LEN {
            return Err(ClientError::validation(
                "Password and Confirm Password fields must be longer than 8.",
            ));
        }
        self.api.master_password(password).await?;
        tracing::info!("Master password set");
        Ok(())
    }

    /// Unlock stored credentials with the master password.
    pub async fn check_master_password(&self, password: &str) -> Result<(), ClientError> {
        self.api.master_password(password).await
    }

    /// Forget the master password and every credential stored with it.
    pub async fn reset_master_password(&self) -> Result<(), ClientError> {
        self.api.reset_master_password().await?;
        tracing::warn!("Master password reset");
        Ok(())
    }

    // ========== Keep-alive ==========

    /// Start pinging `/client_keep_alive/`. Does nothing when already running.
    pub fn start_keep_alive(&self) {
        let mut slot = self.keep_alive.lock();
        if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());

        let api = self.api.clone();
        let period = self.keep_alive_interval;
        tracing::debug!(interval_ms = period.as_millis() as u64, "Keep-alive started");

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = api.client_keep_alive().await {
                            tracing::debug!(error = %e, "Keep-alive failed");
                        }
                    }
                }
            }
            tracing::debug!("Keep-alive stopped");
        });
    }

    pub fn is_keep_alive_running(&self) -> bool {
        self.keep_alive.lock().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    // ========== Unload ==========

    /// Whether leaving now would discard unsaved changes.
    pub fn unload_warning(&self) -> bool {
        self.tabs.has_any_unsaved_changes()
    }

    /// Stop the keep-alive and tell the backend to release this client.
    /// Returns whether the beacon was queued.
    pub fn unload(&self) -> bool {
        if let Some(token) = self.keep_alive.lock().take() {
            token.cancel();
        }
        let sent = self.api.clear_client();
        tracing::info!(beacon_sent = sent, "Client unloaded");
        sent
    }

    /// Run the signed-in part of a session and unload when it ends, whether
    /// `work` succeeded or not. `grace` gives a queued beacon time to leave
    /// before the caller tears the runtime down.
    pub async fn run_then_unload<T>(
        &self,
        work: impl Future<Output = Result<T, ClientError>>,
        grace: Duration,
    ) -> Result<T, ClientError> {
        let result = work.await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Session ended with an error");
        }
        if self.unload() {
            tokio::time::sleep(grace).await;
        }
        result
    }

    /// Answer a message from the embedding frame. Returns the reply to post
    /// back, if any.
    pub async fn handle_frame_message(&self, message: FrameMessage) -> Option<FrameMessage> {
        match message {
            FrameMessage::ConfirmClose => None,
            FrameMessage::RequestClose => {
                if !self.unload_warning() {
                    return Some(FrameMessage::ConfirmClose);
                }
                let request = ConfirmRequest::new("Unsaved changes", UNSAVED_CLOSE_MESSAGE)
                    .confirm_label("Discard and close");
                match self.api.reporter().notifier().confirm(request).await {
                    Some(_) => Some(FrameMessage::ConfirmClose),
                    None => {
                        tracing::debug!("Close cancelled by user");
                        None
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id())
            .field("keep_alive", &self.is_keep_alive_running())
            .finish()
    }
}
