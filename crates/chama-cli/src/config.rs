//! Client configuration at `~/.chama/config.toml`.
//!
//! Provides the default server URL and user id. CLI flags always override
//! config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Chat WebSocket URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// User to authenticate as when `--user` is not given.
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            user_id: None,
        }
    }
}

fn default_url() -> String {
    "ws://localhost:5000/ws".to_string()
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}
