use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::codec::normalize;
use crate::Error;
use crate::Result;

/// Watch supervisor settings
///
/// The supervisor never gives up on a registration. These values only shape
/// how quickly it comes back after a fault.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// First delay after a fault (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the backoff delay (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// A stream that stayed up this long resets the backoff (unit: milliseconds)
    #[serde(default = "default_stable_after_ms")]
    pub stable_after_ms: u64,

    /// Keys the `confwatch` binary watches on startup
    #[serde(default)]
    pub keys: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            stable_after_ms: default_stable_after_ms(),
            keys: Vec::new(),
        }
    }
}

impl WatchConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_millis(self.stable_after_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "watch.base_delay_ms ({}) must not exceed watch.max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ))));
        }

        for key in &self.keys {
            normalize(key).map_err(|e| Error::Config(ConfigError::Message(format!("watch.keys: {e}"))))?;
        }

        Ok(())
    }
}

fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    5000
}
fn default_stable_after_ms() -> u64 {
    10000
}
