//! User settings fetched once per session.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::ClientError;
use crate::models::{Settings, Shortcut, Theme};
use crate::services::api::Api;

/// Cached user settings. Defaults apply until the first fetch.
pub struct SettingsStore {
    api: Api,
    settings: RwLock<Settings>,
    loaded: RwLock<bool>,
}

impl SettingsStore {
    pub fn new(api: Api) -> Self {
        Self { api, settings: RwLock::new(Settings::default()), loaded: RwLock::new(false) }
    }

    /// Fetch settings on first use; later calls return the cached copy.
    pub async fn get_settings(&self) -> Result<Settings, ClientError> {
        if *self.loaded.read() {
            return Ok(self.snapshot());
        }
        let settings = self.api.get_settings().await?;
        tracing::debug!(theme = ?settings.theme, font_size = settings.font_size, "Settings loaded");
        *self.settings.write() = settings.clone();
        *self.loaded.write() = true;
        Ok(settings)
    }

    /// Persist settings and update the cache on success.
    pub async fn save_settings(&self, settings: Settings) -> Result<(), ClientError> {
        self.api.save_settings(&settings).await?;
        *self.settings.write() = settings;
        *self.loaded.write() = true;
        tracing::info!("Settings saved");
        Ok(())
    }

    /// Whether settings were fetched from the backend.
    pub fn is_loaded(&self) -> bool {
        *self.loaded.read()
    }

    /// Current settings without fetching.
    pub fn snapshot(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn theme(&self) -> Theme {
        self.settings.read().theme
    }

    pub fn editor_theme(&self) -> String {
        self.settings.read().editor_theme.clone()
    }

    pub fn font_size(&self) -> u32 {
        self.settings.read().font_size
    }

    pub fn date_format(&self) -> String {
        self.settings.read().date_format.clone()
    }

    /// Whether the tree scrolls to follow the keyboard selection.
    pub fn scroll_tree(&self) -> bool {
        self.settings.read().scroll_tree
    }

    pub fn restore_tabs(&self) -> bool {
        self.settings.read().restore_tabs
    }

    pub fn shortcuts(&self) -> HashMap<String, Shortcut> {
        self.settings.read().shortcuts.clone()
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").field("loaded", &self.is_loaded()).finish()
    }
}
