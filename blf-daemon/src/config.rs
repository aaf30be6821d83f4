//! Daemon configuration
//!
//! One JSON document describes the serial settings, the switches, named
//! functions and boards of the model, and the manager endpoints. Everything
//! is validated before any worker starts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use blf_logic::{Model, ModelError, ModelSpec};
use blf_manager::{ManagerEndpoint, ManagerError};
use blf_protocol::Timeouts;
use blf_sync::PortSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors found while loading or validating the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the configuration directory")]
    NoConfigDir,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("manager {host}: {source}")]
    Manager { host: String, source: ManagerError },

    #[error("manager {0}: username is required")]
    EmptyUsername(String),

    #[error("duplicate manager: {0}")]
    DuplicateManager(String),
}

/// Serial timing shared by all ports
///
/// Zero means "no limit" for timeouts and "wait for a wake" for the retry
/// interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default)]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub retry_interval_ms: u64,
}

impl SerialSettings {
    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            timeouts: Timeouts {
                read: millis(self.read_timeout_ms),
                write: millis(self.write_timeout_ms),
            },
            retry_interval: millis(self.retry_interval_ms),
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialSettings,
    /// Switches, named functions and boards
    #[serde(flatten)]
    pub model: ModelSpec,
    #[serde(default)]
    pub managers: Vec<ManagerEndpoint>,
}

impl Config {
    /// Get the XDG config directory for blf-relay
    /// Uses $XDG_CONFIG_HOME/blf-relay, falls back to ~/.config/blf-relay
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("blf-relay"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("blf-relay"))
    }

    /// Default configuration file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Self::config_dir()
            .map(|dir| dir.join("config.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the manager endpoints
    ///
    /// Model problems are reported by [`Config::build_model`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for endpoint in &self.managers {
            if endpoint.username.trim().is_empty() {
                return Err(ConfigError::EmptyUsername(endpoint.host.clone()));
            }
            let uri = endpoint.base_uri().map_err(|source| ConfigError::Manager {
                host: endpoint.host.clone(),
                source,
            })?;
            if !seen.insert(uri.as_str().to_lowercase()) {
                return Err(ConfigError::DuplicateManager(uri.to_string()));
            }
        }
        Ok(())
    }

    pub fn build_model(&self) -> Result<Model, ConfigError> {
        Ok(Model::build(&self.model)?)
    }
}

/// Display name of a manager endpoint in logs and worker names
pub fn manager_name(endpoint: &ManagerEndpoint) -> String {
    format!("{}:{}", endpoint.host.trim(), endpoint.port)
}
