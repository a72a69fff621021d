use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Parameters for the connection to the coordination service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// Service endpoints, e.g. `localhost:2379` or `http://10.0.0.1:2379`
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Maximum time to establish the connection in milliseconds
    /// Default: 5 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Deadline of every one-shot get/put/delete in milliseconds
    /// Default: 10 seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout_in_secs: u64,

    /// Optional credentials, passed through to the client library
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            keep_alive_interval_in_secs: default_keep_alive_interval(),
            keep_alive_timeout_in_secs: default_keep_alive_timeout(),
            user: None,
            password: None,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_in_secs)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_in_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() || self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::Config(ConfigError::Message(
                "connection.endpoints must list at least one non-empty address".into(),
            )));
        }

        if self.connect_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "connection.connect_timeout_in_ms must be > 0".into(),
            )));
        }

        if self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "connection.request_timeout_in_ms must be > 0".into(),
            )));
        }

        if self.user.is_some() != self.password.is_some() {
            return Err(Error::Config(ConfigError::Message(
                "connection.user and connection.password must be set together".into(),
            )));
        }

        Ok(())
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["localhost:2379".to_string()]
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_request_timeout() -> u64 {
    10000
}
fn default_keep_alive_interval() -> u64 {
    30
}
fn default_keep_alive_timeout() -> u64 {
    10
}
