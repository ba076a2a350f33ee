//! Server configuration: TOML file + CLI overrides.

use chama_core::{ChamaError, ChamaResult};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub seed: SeedSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            ws_path: default_ws_path(),
            outbound_queue: default_outbound_queue(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

/// `[store]` section. No `database_url` means the in-memory store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSection {
    pub database_url: Option<String>,
}

/// `[seed]` section: users and chama memberships loaded at start-up.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SeedSection {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub groups: Vec<SeedGroup>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedUser {
    pub id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedGroup {
    pub id: i64,
    #[serde(default)]
    pub members: Vec<i64>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_outbound_queue() -> usize {
    256
}
fn default_max_frame_size() -> usize {
    64 * 1024
}

/// Resolved server configuration (CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub ws_path: String,
    pub outbound_queue: usize,
    pub max_frame_size: usize,
    pub database_url: Option<String>,
    pub seed: SeedSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
        cli_database_url: Option<&str>,
    ) -> ChamaResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let mut config = Self::from_file(file_config);
        if let Some(bind) = cli_bind {
            config.bind = bind.to_string();
        }
        if let Some(port) = cli_port {
            config.port = port;
        }
        if let Some(url) = cli_database_url {
            config.database_url = Some(url.to_string());
        }
        config.validate()?;
        Ok(config)
    }

    fn from_file(file: ConfigFile) -> Self {
        Self {
            bind: file.server.bind,
            port: file.server.port,
            ws_path: file.server.ws_path,
            outbound_queue: file.server.outbound_queue,
            max_frame_size: file.server.max_frame_size,
            database_url: file.store.database_url,
            seed: file.seed,
        }
    }

    fn validate(&self) -> ChamaResult<()> {
        if !self.ws_path.starts_with('/') {
            return Err(ChamaError::Config(format!(
                "ws_path must start with '/': {}",
                self.ws_path
            )));
        }
        if self.outbound_queue == 0 {
            return Err(ChamaError::Config("outbound_queue must be at least 1".into()));
        }
        for user in &self.seed.users {
            if user.id <= 0 {
                return Err(ChamaError::Config(format!("seed user id must be positive: {}", user.id)));
            }
        }
        for group in &self.seed.groups {
            if group.id <= 0 {
                return Err(ChamaError::Config(format!("seed group id must be positive: {}", group.id)));
            }
        }
        self.listen_addr().map(|_| ())
    }

    /// Socket address to bind.
    pub fn listen_addr(&self) -> ChamaResult<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| ChamaError::Config(format!("invalid bind address {}: {e}", self.bind)))
    }
}

fn parse(content: &str) -> ChamaResult<ConfigFile> {
    toml::from_str(content).map_err(|e| ChamaError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
