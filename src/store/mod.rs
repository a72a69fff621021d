//! Configuration store façade
//!
//! [`ConfigStore`] is the entry point: typed `get`, JSON-checked `put`,
//! idempotent `delete` and supervised `watch` against one coordination
//! service connection.
//!
//! # Basic Usage
//! ```no_run
//! use confwatch::{ChangeEvent, ConfigStore, StoreConfig};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct Limits {
//!     total: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> confwatch::Result<()> {
//!     let store = ConfigStore::connect(StoreConfig::new()?.validate()?).await?;
//!
//!     store.put("app/limits", br#"{"total":100}"#).await?;
//!
//!     let mut limits = Limits::default();
//!     store.get("app/limits", &mut limits).await?;
//!
//!     store.watch("app/limits", |event: ChangeEvent| {
//!         println!("limits changed: {:?}", event);
//!     })?;
//!     Ok(())
//! }
//! ```


use std::future::Future;
use std::sync::Arc;

use autometrics::autometrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::codec::decode;
use crate::codec::encode;
use crate::codec::normalize;
use crate::codec::validate_json;
use crate::constants::PROBE_KEY;
use crate::metrics::register_custom_metrics;
use crate::ChangeEvent;
use crate::CoordinationClient;
use crate::EtcdCoordinator;
use crate::Error;
use crate::RegistrationStatus;
use crate::Result;
use crate::StoreConfig;
use crate::WatchSupervisor;
use crate::API_SLO;

/// Live configuration backed by a coordination service
///
/// All operations take `&self` and may be called concurrently. Get, put and
/// delete each run exactly one remote round trip inside a fresh deadline of
/// `connection.request_timeout_in_ms`; they never retry. Watches run in the
/// background until the process exits or [`shutdown`](ConfigStore::shutdown)
/// is called.
pub struct ConfigStore<C = EtcdCoordinator> {
    client: Arc<C>,
    config: StoreConfig,
    supervisor: WatchSupervisor<C>,
}

impl ConfigStore<EtcdCoordinator> {
    /// Validates `config`, connects to etcd and probes it once.
    ///
    /// # Errors
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::ConnectionUnavailable`] if the cluster cannot be reached
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let config = config.validate()?;
        let client = EtcdCoordinator::connect(&config.connection).await?;
        Self::with_client(client, config).await
    }
}

impl<C> ConfigStore<C>
where
    C: CoordinationClient,
{
    /// Binds the store to an already constructed client.
    ///
    /// Performs one bounded read of a probe key; if that does not succeed the
    /// store is not created. Must be called from within a tokio runtime, whose
    /// handle runs the watch tasks.
    pub async fn with_client(
        client: C,
        config: StoreConfig,
    ) -> Result<Self> {
        register_custom_metrics();
        let client = Arc::new(client);

        let probe = normalize(PROBE_KEY)?;
        let deadline = config.connection.request_timeout();
        let reason = match timeout(deadline, client.get(&probe)).await {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("probe read timed out after {deadline:?}")),
        };
        if let Some(reason) = reason {
            error!("coordination service probe failed: {}", reason);
            return Err(Error::ConnectionUnavailable {
                endpoints: config.connection.endpoints.clone(),
                reason,
            });
        }

        let supervisor = WatchSupervisor::new(client.clone(), config.watch.clone(), Handle::current());
        Ok(Self {
            client,
            config,
            supervisor,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Decodes the value at `key` into `target`.
    ///
    /// A missing key is not an error: `target` is left as it was. On a decode
    /// failure `target` is left untouched as well.
    ///
    /// # Errors
    /// - [`Error::InvalidKey`] before any remote call
    /// - [`Error::RemoteTimeout`] / [`Error::RemoteFailure`] from the round trip
    /// - [`Error::Decode`] when the stored document does not fit `T`
    #[autometrics(objective = API_SLO)]
    pub async fn get<T>(
        &self,
        key: &str,
        target: &mut T,
    ) -> Result<()>
    where
        T: DeserializeOwned,
    {
        if let Some(value) = self.get_value(key).await? {
            *target = value;
        }
        Ok(())
    }

    /// Like [`get`](ConfigStore::get) but returns `None` for a missing key.
    pub async fn get_value<T>(
        &self,
        key: &str,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let key = normalize(key)?;
        match self.bounded("get", self.client.get(&key)).await? {
            Some(bytes) => decode(&key, &bytes).map(Some),
            None => {
                debug!("get {}: no value", key);
                Ok(None)
            }
        }
    }

    /// Raw stored bytes, `None` for a missing key.
    pub async fn get_raw(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let key = normalize(key)?;
        self.bounded("get", self.client.get(&key)).await
    }

    /// Stores `value` at `key`, replacing any previous value.
    ///
    /// # Errors
    /// - [`Error::InvalidKey`] / [`Error::InvalidValue`] before any remote call
    /// - [`Error::RemoteTimeout`] / [`Error::RemoteFailure`] from the round trip
    #[autometrics(objective = API_SLO)]
    pub async fn put(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
    ) -> Result<()> {
        let key = normalize(key)?;
        let value = value.as_ref();
        validate_json(value)?;
        self.bounded("put", self.client.put(&key, value.to_vec())).await
    }

    /// Serializes `value` as JSON and stores it at `key`.
    pub async fn put_json<T>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = normalize(key)?;
        let bytes = encode(value)?;
        self.bounded("put", self.client.put(&key, bytes)).await
    }

    /// Removes `key`. Deleting a key that does not exist succeeds.
    #[autometrics(objective = API_SLO)]
    pub async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        let key = normalize(key)?;
        self.bounded("delete", self.client.delete(&key)).await
    }

    /// Registers `handler` for every change on `key` and returns at once.
    ///
    /// The handler runs on a background task, synchronously and in revision
    /// order. If it panics, the stream is restarted after the offending event
    /// and delivery continues with the next one. Registrations live until the
    /// process exits or [`shutdown`](ConfigStore::shutdown) is called.
    ///
    /// Every change made after this call returns is delivered, including
    /// changes made while the stream is being (re)established.
    ///
    /// # Handler contract
    /// The handler is called directly on a tokio worker thread and must not
    /// block: no blocking I/O, no `std::thread::sleep`, no waiting on locks
    /// held across slow work. Hand heavy work off instead, e.g. push the event
    /// into a `tokio::sync::mpsc` channel or use `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    /// - [`Error::InvalidKey`]
    /// - [`Error::WatchShutdown`] after `shutdown`
    pub fn watch<F>(
        &self,
        key: &str,
        handler: F,
    ) -> Result<()>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let key = normalize(key)?;
        let id = self.supervisor.register(key.clone(), handler)?;
        debug!("watch {} registered as {}", key, id);
        Ok(())
    }

    /// Keys with a live watch registration
    pub fn watched_keys(&self) -> Vec<crate::ConfigKey> {
        self.supervisor.watched_keys()
    }

    pub fn watch_status(&self) -> Vec<RegistrationStatus> {
        self.supervisor.status()
    }

    /// Stops all watch registrations. One-shot operations keep working.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    /// Runs one remote round trip inside its own deadline.
    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let duration = self.config.connection.request_timeout();
        match timeout(duration, call).await {
            Ok(Err(Error::RemoteTimeout { .. })) => Err(Error::RemoteTimeout { op, duration }),
            Ok(result) => result,
            Err(_) => {
                warn!("{} timed out after {:?}", op, duration);
                Err(Error::RemoteTimeout { op, duration })
            }
        }
    }
}
