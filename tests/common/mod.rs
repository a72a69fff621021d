use std::time::Duration;

use confwatch::ConfigStore;
use confwatch::MemoryCoordinator;
use confwatch::StoreConfig;
use serde::Deserialize;
use serde::Serialize;
use tokio::time::sleep;
use tokio::time::Instant;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductConfig {
    pub product_id: i64,
    pub status: i8,
    pub total: i32,
}

pub async fn start_store() -> (ConfigStore<MemoryCoordinator>, MemoryCoordinator) {
    let mut config = StoreConfig::default();
    config.connection.request_timeout_in_ms = 500;
    config.watch.base_delay_ms = 5;
    config.watch.max_delay_ms = 50;
    let config = config.validate().expect("test config should be valid");

    let coordinator = MemoryCoordinator::new();
    let store = ConfigStore::with_client(coordinator.clone(), config)
        .await
        .expect("memory store should connect");
    (store, coordinator)
}

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
