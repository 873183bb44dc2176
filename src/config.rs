use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Buffer size for source and engine channels
pub const DEFAULT_CHANNEL_BUFFER: usize = 1024;

/// Configuration for longview
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pixel height of one rendered line
    pub item_height: u32,
    /// Pixel width of one text column (glyph cell)
    pub column_px: u32,
    /// Columns occupied by a tab stop
    pub tab_columns: u32,
    /// Target wrap width in columns; 0 disables wrapping
    pub wrap_columns: u32,
    /// Stick to the newest lines as they arrive
    pub follow: bool,
    /// Theme name (default, monochrome)
    pub theme: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            item_height: 16,
            column_px: 8,
            tab_columns: 4,
            wrap_columns: 0,
            follow: true,
            theme: "default".to_string(),
        }
    }
}

impl Config {
    /// Load the config file, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file().unwrap_or_default();
        config.apply_env();
        config
    }

    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("longview"))
    }

    fn from_file() -> Option<Self> {
        let path = Self::config_dir()?.join("config.toml");
        let text = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring malformed config file: {e}");
                None
            }
        }
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("LONGVIEW_ITEM_HEIGHT") {
            self.item_height = v;
        }
        if let Some(v) = env_parse("LONGVIEW_TAB_COLUMNS") {
            self.tab_columns = v;
        }
        if let Some(v) = env_parse("LONGVIEW_WRAP_COLUMNS") {
            self.wrap_columns = v;
        }
        if let Ok(v) = std::env::var("LONGVIEW_THEME") {
            self.theme = v;
        }
    }
}

fn env_parse(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// A saved search query, persisted across sessions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedSearch {
    pub name: String,
    pub query: String,
}

fn searches_path() -> Option<PathBuf> {
    Config::config_dir().map(|d| d.join("searches.json"))
}

/// Load saved searches; a missing or unreadable file is an empty list.
pub fn load_saved_searches() -> Vec<SavedSearch> {
    let Some(path) = searches_path() else {
        return Vec::new();
    };
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    serde_json::from_str(&text).unwrap_or_default()
}

/// Persist saved searches as JSON next to the config file.
pub fn save_saved_searches(searches: &[SavedSearch]) -> Result<()> {
    let path = searches_path().context("no config directory available")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(searches)?;
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.item_height, 16);
        assert!(config.follow);
        assert_eq!(config.theme, "default");
    }

    #[test]
    fn test_toml_partial_override() {
        let config: Config = toml::from_str("item_height = 20\ntheme = \"monochrome\"").unwrap();
        assert_eq!(config.item_height, 20);
        assert_eq!(config.theme, "monochrome");
        // Unset keys keep their defaults.
        assert_eq!(config.tab_columns, 4);
    }

    #[test]
    fn test_saved_search_round_trip() {
        let searches = vec![SavedSearch {
            name: "errors".to_string(),
            query: "##[error]".to_string(),
        }];
        let json = serde_json::to_string(&searches).unwrap();
        let back: Vec<SavedSearch> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].query, "##[error]");
    }
}
