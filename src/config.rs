//! Configuration management for the bridge
//!
//! Supports configuration via:
//! - Environment variables (primary)
//! - Optional TOML config file (secondary)
//!
//! Environment variables take precedence over config file values.
//! Credentials are never part of the configuration; they arrive with
//! every request payload.

use serde::{Deserialize, Serialize};

use crate::errors::{BridgeError, Result};

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Text appended to the User-Agent header (default: none)
    #[serde(default)]
    pub user_agent_append: Option<String>,

    /// Request timeout in seconds (default: 300)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent_append: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// B2 HTTP client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Log level (default: warn)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - B2_TF_CONFIG_FILE: optional path to TOML config file
    /// - B2_USER_AGENT_APPEND: text appended to the User-Agent header
    /// - B2_TF_TIMEOUT_SECS: HTTP request timeout (default: 300)
    /// - B2_TF_LOG_LEVEL: log level (default: warn)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("B2_TF_CONFIG_FILE") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(append) = lookup("B2_USER_AGENT_APPEND") {
            if !append.is_empty() {
                config.client.user_agent_append = Some(append);
            }
        }

        if let Some(timeout) = lookup("B2_TF_TIMEOUT_SECS") {
            config.client.timeout_secs = timeout.parse().map_err(|_| {
                BridgeError::Config(format!("B2_TF_TIMEOUT_SECS is not a number: {}", timeout))
            })?;
        }

        if let Some(level) = lookup("B2_TF_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("invalid config file {}: {}", path, e)))
    }
}
