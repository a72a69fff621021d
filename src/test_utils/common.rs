use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::ChangeEvent;
use crate::ConfigStore;
use crate::MemoryCoordinator;
use crate::StoreConfig;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductConfig {
    pub product_id: i64,
    pub status: i8,
    pub total: i32,
}

impl ProductConfig {
    pub fn new(
        product_id: i64,
        total: i32,
    ) -> Self {
        Self {
            product_id,
            status: 0,
            total,
        }
    }
}

/// Store settings with a tight backoff so restart tests stay fast
pub fn fast_config() -> StoreConfig {
    let mut config = StoreConfig::default();
    config.connection.request_timeout_in_ms = 200;
    config.watch.base_delay_ms = 5;
    config.watch.max_delay_ms = 20;
    config
}

pub async fn memory_store() -> (ConfigStore<MemoryCoordinator>, MemoryCoordinator) {
    let coordinator = MemoryCoordinator::new();
    let store = ConfigStore::with_client(coordinator.clone(), fast_config())
        .await
        .expect("memory store should always connect");
    (store, coordinator)
}

/// Shared sink a watch handler can push into
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<ChangeEvent>>>);

impl EventLog {
    pub fn push(
        &self,
        event: ChangeEvent,
    ) {
        self.0.lock().push(event);
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn snapshot(&self) -> Vec<ChangeEvent> {
        self.0.lock().clone()
    }

    pub fn revisions(&self) -> Vec<i64> {
        self.0.lock().iter().map(|e| e.revision()).collect()
    }
}

/// Polls `condition` until it holds or `WAIT_TIMEOUT` elapses.
pub async fn wait_until(
    what: &str,
    mut condition: impl FnMut() -> bool,
) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}
