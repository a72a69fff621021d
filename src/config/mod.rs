//! Configuration management for the configuration store.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//!
//! There is no process-wide config: a [`StoreConfig`] is built once and
//! handed to [`ConfigStore::connect`](crate::ConfigStore::connect).
mod connection;
mod watch;
pub use connection::*;
pub use watch::*;

#[cfg(test)]
mod config_test;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::Result;

/// Main configuration container
///
/// Sources are merged with increasing priority:
/// 1. Default values from code
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables prefixed with `CONFWATCH__`
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// How to reach the coordination service
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Watch supervisor behaviour
    #[serde(default)]
    pub watch: WatchConfig,
}

impl StoreConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so that `with_override_config()` can still be
    /// applied. Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/confwatch.toml");
    /// std::env::set_var("CONFWATCH__CONNECTION__REQUEST_TIMEOUT_IN_MS", "2000");
    /// let cfg = StoreConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from a file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.connection.validate()?;
        self.watch.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("connection.endpoints")
        .with_list_parse_key("watch.keys")
}
