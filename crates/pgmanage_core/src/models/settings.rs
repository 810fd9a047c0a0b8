//! User preferences.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A keyboard shortcut binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shortcut {
    /// Key code, e.g. `Q`
    pub shortcut_code: String,
    /// Ctrl modifier
    pub ctrl_pressed: bool,
    /// Shift modifier
    pub shift_pressed: bool,
    /// Alt modifier
    pub alt_pressed: bool,
    /// Meta modifier
    pub meta_pressed: bool,
}

/// Application theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light theme
    #[default]
    Light,
    /// Dark theme
    Dark,
}

/// User preferences shared by every tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application theme
    pub theme: Theme,
    /// Editor color theme
    pub editor_theme: String,
    /// Editor font size in pixels
    pub font_size: u32,
    /// Date format used in grids
    pub date_format: String,
    /// CSV export encoding
    pub csv_encoding: String,
    /// CSV export delimiter
    pub csv_delimiter: String,
    /// Maximum characters shown per grid cell
    pub max_column_size: Option<u32>,
    /// Scroll the tree to follow the selection
    pub scroll_tree: bool,
    /// Restore open tabs after reload
    pub restore_tabs: bool,
    /// Editor autocomplete
    pub autocomplete: bool,
    /// Shortcut bindings by action name
    pub shortcuts: HashMap<String, Shortcut>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            editor_theme: "omnidb".to_string(),
            font_size: 12,
            date_format: "YYYY-MM-DD HH:mm:ss".to_string(),
            csv_encoding: "utf-8".to_string(),
            csv_delimiter: ";".to_string(),
            max_column_size: None,
            scroll_tree: true,
            restore_tabs: true,
            autocomplete: true,
            shortcuts: HashMap::new(),
        }
    }
}
