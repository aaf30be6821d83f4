//! Manager endpoint settings

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// Connection settings for one manager endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerEndpoint {
    /// Host name or address
    pub host: String,
    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path prefix in front of `rawman`
    #[serde(default = "default_path")]
    pub path: String,
    /// Use HTTPS
    #[serde(default)]
    pub secure: bool,
    /// Manager user
    pub username: String,
    /// Manager secret
    #[serde(default)]
    pub password: String,
    /// Device name format, `{0}` is replaced by the switch name
    #[serde(default = "default_device_format")]
    pub device_format: String,
    /// Wait after a failed logon; 0 waits for an explicit wake
    #[serde(default)]
    pub retry_interval_ms: u64,
    /// Simultaneous HTTP requests
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
}

fn default_port() -> u16 {
    8088
}

fn default_path() -> String {
    "/asterisk/".to_string()
}

fn default_device_format() -> String {
    "Custom:{0}".to_string()
}

fn default_max_requests() -> usize {
    2
}

impl ManagerEndpoint {
    /// Endpoint with default port, path and device format
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            path: default_path(),
            secure: false,
            username: username.into(),
            password: password.into(),
            device_format: default_device_format(),
            retry_interval_ms: 0,
            max_requests: default_max_requests(),
        }
    }

    /// Base URI that `rawman` is resolved against (always ends with `/`)
    pub fn base_uri(&self) -> Result<Url, ManagerError> {
        let scheme = if self.secure { "https" } else { "http" };
        let path = self.path.trim().trim_matches('/');
        let uri = if path.is_empty() {
            format!("{scheme}://{}:{}/", self.host.trim(), self.port)
        } else {
            format!("{scheme}://{}:{}/{path}/", self.host.trim(), self.port)
        };

        let url = Url::parse(&uri).map_err(|e| ManagerError::InvalidUri {
            uri: uri.clone(),
            reason: e.to_string(),
        })?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ManagerError::InvalidUri {
                uri,
                reason: "missing host".to_string(),
            });
        }
        Ok(url)
    }

    /// Retry wait, `None` meaning "until woken"
    pub fn retry_interval(&self) -> Option<Duration> {
        (self.retry_interval_ms > 0).then(|| Duration::from_millis(self.retry_interval_ms))
    }
}
