//! Client configuration loading
//!
//! Resolution order for each setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error; a malformed one is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ingest::StreamCompletion;
use crate::{Error, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:5001/api";

pub const ENV_API_URL: &str = "IPINTEL_API_URL";
pub const ENV_CONFIG: &str = "IPINTEL_CONFIG";
pub const ENV_STORAGE: &str = "IPINTEL_STORAGE";

const APP_DIR: &str = "ipintel";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the enrichment service, including the `/api` prefix
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Credential storage file; platform data dir when unset
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// Timeout for non-streaming requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause at each step of the post-validation redirect
    #[serde(default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stop consuming a stream after this many seconds without a message.
    /// Unset: consume until the server closes the connection.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_redirect_delay_ms() -> u64 {
    1500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            storage_path: None,
            request_timeout_secs: default_request_timeout_secs(),
            redirect_delay_ms: default_redirect_delay_ms(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn stream_completion(&self) -> StreamCompletion {
        match self.stream.idle_timeout_secs {
            Some(secs) if secs > 0 => StreamCompletion::IdleTimeout(Duration::from_secs(secs)),
            _ => StreamCompletion::ServerClose,
        }
    }

    /// Configured storage file, else the platform default
    pub fn storage_file(&self) -> PathBuf {
        self.storage_path.clone().unwrap_or_else(default_storage_path)
    }
}

/// `<config dir>/ipintel/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// `<data dir>/ipintel/keys.toml`, falling back to the working directory
pub fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./ipintel_data"))
        .join("keys.toml")
}

/// Parse one config file
pub fn load_config_file(path: &Path) -> Result<ClientConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub storage_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Build the effective configuration
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ClientConfig> {
    let config_path = overrides
        .config_path
        .clone()
        .or_else(|| env_value(ENV_CONFIG).map(PathBuf::from))
        .or_else(default_config_path);

    let mut config = match config_path {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "Loading config file");
            load_config_file(&path)?
        }
        Some(path) => {
            if overrides.config_path.is_some() {
                warn!(path = %path.display(), "Config file not found, using defaults");
            }
            ClientConfig::default()
        }
        None => ClientConfig::default(),
    };

    if let Some(url) = overrides.api_url.clone().or_else(|| env_value(ENV_API_URL)) {
        config.api_url = url;
    }
    if let Some(path) = overrides
        .storage_path
        .clone()
        .or_else(|| env_value(ENV_STORAGE).map(PathBuf::from))
    {
        config.storage_path = Some(path);
    }
    if let Some(level) = overrides.log_level.clone() {
        config.logging.level = level;
    }

    Ok(config)
}
