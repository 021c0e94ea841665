//! Settings file support.
//!
//! Reads `$HOME/.authorscope/settings.json` and uses its `env` map as a
//! fallback for environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Settings loaded from `$HOME/.authorscope/settings.json`.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Environment variable overrides.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Settings {
    /// Loads settings from the default location.
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::load_from_path(&settings_path)
    }

    /// Loads settings from a specific path. A missing file yields empty settings.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        serde_json::from_str::<Self>(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Returns the default settings path.
    pub fn get_settings_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

        Ok(home_dir.join(".authorscope").join("settings.json"))
    }

    /// Returns an environment variable with fallback to settings.
    ///
    /// Blank values count as unset.
    pub fn get_env_var(&self, key: &str) -> Option<String> {
        env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                self.env
                    .get(key)
                    .filter(|value| !value.trim().is_empty())
                    .cloned()
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn load_from_path_reads_env_map() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        fs::write(
            &settings_path,
            r#"{ "env": { "AUTHORSCOPE_TEST_ONLY_KEY": "from-file", "AUTHORSCOPE_TEST_BLANK": " " } }"#,
        )
        .unwrap();

        let settings = Settings::load_from_path(&settings_path).unwrap();

        assert_eq!(
            settings.get_env_var("AUTHORSCOPE_TEST_ONLY_KEY").as_deref(),
            Some("from-file")
        );
        assert_eq!(settings.get_env_var("AUTHORSCOPE_TEST_BLANK"), None);
        assert_eq!(settings.get_env_var("AUTHORSCOPE_TEST_MISSING"), None);
    }

    #[test]
    fn missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from_path(temp_dir.path().join("nope.json")).unwrap();
        assert!(settings.env.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        fs::write(&settings_path, "{ not json").unwrap();

        let err = Settings::load_from_path(&settings_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings file"));
    }

    #[test]
    fn settings_path_ends_with_app_dir() {
        if let Ok(path) = Settings::get_settings_path() {
            assert!(path.ends_with(".authorscope/settings.json"));
        }
    }
}
