//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `TSBRIDGE_*` environment variable overrides.

use crate::transport::{AuthMode, TransportConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Point type registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// JSON file backing the registry
    #[serde(default = "default_registry_path")]
    pub path: String,

    /// Optional key group prefix
    pub group: Option<String>,
}

fn default_registry_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("tsbridge").join("types.json").to_string_lossy().to_string())
        .unwrap_or_else(|| "./tsbridge_types.json".to_string())
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            group: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tsbridge").join("config.toml")),
            Some(PathBuf::from("/etc/tsbridge/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Transport overrides
        if let Some(url) = var("TSBRIDGE_URL") {
            self.transport.url = url;
        }
        if let Some(user) = var("TSBRIDGE_USER") {
            self.transport.username = user;
        }
        if let Some(password) = var("TSBRIDGE_PASSWORD") {
            self.transport.password = password;
        }
        if let Some(auth) = var("TSBRIDGE_AUTH") {
            self.transport.auth = match auth.to_lowercase().as_str() {
                "basic" => AuthMode::Basic,
                "token" => AuthMode::Token,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "TSBRIDGE_AUTH must be 'basic' or 'token', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(timeout) = var("TSBRIDGE_TIMEOUT_MS") {
            self.transport.request_timeout_ms = timeout.parse().map_err(|_| {
                ConfigError::Invalid(format!("TSBRIDGE_TIMEOUT_MS is not a number: '{}'", timeout))
            })?;
        }

        // Registry overrides
        if let Some(path) = var("TSBRIDGE_REGISTRY_PATH") {
            self.registry.path = path;
        }
        if let Some(group) = var("TSBRIDGE_REGISTRY_GROUP") {
            self.registry.group = Some(group).filter(|g| !g.is_empty());
        }

        // Logging overrides
        if let Some(level) = var("TSBRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("TSBRIDGE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# tsbridge Configuration
#
# Environment variables override these settings:
# - TSBRIDGE_URL
# - TSBRIDGE_USER
# - TSBRIDGE_PASSWORD
# - TSBRIDGE_AUTH
# - TSBRIDGE_TIMEOUT_MS
# - TSBRIDGE_REGISTRY_PATH
# - TSBRIDGE_REGISTRY_GROUP
# - TSBRIDGE_LOG_LEVEL
# - TSBRIDGE_LOG_FORMAT

[transport]
# Base URL of the engine REST endpoint
url = "http://localhost:6041"

# Authentication: basic (credentials on every request) or token (login once)
auth = "basic"

username = "root"
password = "taosdata"

# Per-request deadline (ms)
request_timeout_ms = 5000

[registry]
# File backing the point type registry (default: <data dir>/tsbridge/types.json)
# path = "/var/lib/tsbridge/types.json"

# Optional key group prefix
# group = "tsdb"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/tsbridge/tsbridge.log"
"#
    .to_string()
}
