//! Editor configuration
//!
//! Tunables for history depth, auto-layout spacing and autosave timing.
//! Every field has a default from [`crate::constants`], so a partial (or
//! missing) config file is fine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{autosave, history, layout};
use crate::error::Result;

/// Spacing used by auto-layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_spacing: layout::HORIZONTAL_SPACING,
            vertical_spacing: layout::VERTICAL_SPACING,
            origin_x: layout::ORIGIN_X,
            origin_y: layout::ORIGIN_Y,
        }
    }
}

/// Autosave timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutosaveConfig {
    /// Whether edits schedule autosaves at all
    pub enabled: bool,
    /// Debounce window in milliseconds
    pub debounce_ms: u64,
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: autosave::DEBOUNCE_MS,
        }
    }
}

/// Top-level editor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Maximum undo snapshots
    pub history_limit: usize,
    pub layout: LayoutConfig,
    pub autosave: AutosaveConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: history::MAX_ENTRIES,
            layout: LayoutConfig::default(),
            autosave: AutosaveConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Load configuration from a JSON file, falling back to defaults if absent
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No editor config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save configuration as pretty-printed JSON
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EditorConfig =
            serde_json::from_str(r#"{"autosave": {"debounceMs": 500}}"#).unwrap();
        assert_eq!(config.history_limit, history::MAX_ENTRIES);
        assert_eq!(config.autosave.debounce(), Duration::from_millis(500));
        assert!(config.autosave.enabled);
        assert_eq!(config.layout, LayoutConfig::default());
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = EditorConfig::load(temp_dir.path().join("editor.json")).await.unwrap();
        assert_eq!(config, EditorConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("editor.json");

        let mut config = EditorConfig::default();
        config.history_limit = 20;
        config.layout.vertical_spacing = 90.0;
        config.save(&path).await.unwrap();

        let loaded = EditorConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }
}
