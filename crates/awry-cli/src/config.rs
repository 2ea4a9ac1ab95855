//! CLI configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Where the profile store lives.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Backend executable invoked once per request.
    #[serde(default = "default_backend_path")]
    pub backend_path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("awry")
        .join("awry.db")
}

fn default_backend_path() -> PathBuf {
    // Resolved via PATH when not configured explicitly.
    PathBuf::from("awry-backend")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            backend_path: default_backend_path(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the default location or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("awry")
            .join("config.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }
}
