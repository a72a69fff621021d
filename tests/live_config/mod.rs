use std::collections::HashMap;
use std::sync::Arc;

use confwatch::ChangeEvent;
use confwatch::ConfigStore;
use confwatch::MemoryCoordinator;
use confwatch::WatchState;
use parking_lot::Mutex;
use tracing_test::traced_test;

use crate::common::start_store;
use crate::common::wait_until;
use crate::common::ProductConfig;

const PRODUCT_KEY: &str = "company/test/before/product";

type ProductTable = HashMap<i32, ProductConfig>;

fn table(entries: &[(i32, i32)]) -> ProductTable {
    entries
        .iter()
        .map(|&(id, total)| {
            (
                id,
                ProductConfig {
                    product_id: id as i64,
                    status: 0,
                    total,
                },
            )
        })
        .collect()
}

fn streaming(store: &ConfigStore<MemoryCoordinator>) -> bool {
    store
        .watch_status()
        .iter()
        .all(|s| s.state == WatchState::Streaming)
}

/// Local cache of the product table, refreshed by a watch
#[derive(Clone, Default)]
struct ProductCache {
    table: Arc<Mutex<Option<ProductTable>>>,
}

impl ProductCache {
    fn apply(
        &self,
        event: ChangeEvent,
    ) {
        match event {
            ChangeEvent::Put { value, .. } => {
                let table: ProductTable =
                    serde_json::from_slice(&value).expect("product table should decode");
                *self.table.lock() = Some(table);
            }
            ChangeEvent::Delete { .. } => *self.table.lock() = None,
        }
    }

    fn current(&self) -> Option<ProductTable> {
        self.table.lock().clone()
    }
}

#[tokio::test]
#[traced_test]
async fn test_cache_follows_remote_changes() {
    let (store, coordinator) = start_store().await;

    let initial = table(&[(1, 100), (2, 1000)]);
    store.put_json(PRODUCT_KEY, &initial).await.unwrap();

    let cache = ProductCache::default();
    let mut seeded = ProductTable::new();
    store.get(PRODUCT_KEY, &mut seeded).await.unwrap();
    *cache.table.lock() = Some(seeded);

    let sink = cache.clone();
    store.watch(PRODUCT_KEY, move |event| sink.apply(event)).unwrap();
    wait_until("watch to stream", || streaming(&store)).await;

    // Plain update
    let updated = table(&[(1, 90), (2, 1000)]);
    store.put_json(PRODUCT_KEY, &updated).await.unwrap();
    wait_until("first update", || cache.current() == Some(updated.clone())).await;

    // A document of the wrong shape makes the handler panic; the watch survives
    store.put(PRODUCT_KEY, b"[1,2,3]").await.unwrap();
    let fixed = table(&[(1, 80)]);
    store.put_json(PRODUCT_KEY, &fixed).await.unwrap();
    wait_until("update after handler fault", || cache.current() == Some(fixed.clone())).await;

    // Server drops the stream; writes made meanwhile still arrive
    coordinator.disconnect_watchers();
    let after_drop = table(&[(1, 70), (3, 5)]);
    store.put_json(PRODUCT_KEY, &after_drop).await.unwrap();
    wait_until("update after reconnect", || {
        cache.current() == Some(after_drop.clone())
    })
    .await;

    store.delete(PRODUCT_KEY).await.unwrap();
    wait_until("delete", || cache.current().is_none()).await;

    let status = store.watch_status();
    assert_eq!(status.len(), 1);
    assert!(status[0].restarts >= 2);
    assert_eq!(status[0].last_revision, Some(coordinator.current_revision()));

    store.shutdown();
    wait_until("watch to stop", || store.watched_keys().is_empty()).await;
}

#[tokio::test]
#[traced_test]
async fn test_missing_key_keeps_defaults() {
    let (store, _) = start_store().await;

    let mut config = ProductConfig {
        product_id: 9,
        status: 1,
        total: 10,
    };
    store.get("/product/9", &mut config).await.unwrap();
    assert_eq!(config.total, 10);

    store.delete("/product/9").await.unwrap();
}

#[tokio::test]
#[traced_test]
async fn test_independent_keys_watch_independently() {
    let (store, coordinator) = start_store().await;
    let broken = confwatch::normalize("/flags/broken").unwrap();
    coordinator.fail_watches_on(&broken);

    let seen: Arc<Mutex<Vec<i64>>> = Arc::default();
    let sink = seen.clone();
    store.watch("/flags/broken", |_| {}).unwrap();
    store
        .watch("/flags/ok", move |event| sink.lock().push(event.revision()))
        .unwrap();

    wait_until("broken key to retry", || coordinator.watch_attempts(&broken) >= 3).await;
    wait_until("healthy key to stream", || {
        store
            .watch_status()
            .iter()
            .any(|s| s.key.as_str() == "/flags/ok" && s.state == WatchState::Streaming)
    })
    .await;

    store.put("/flags/ok", br#"{"on":true}"#).await.unwrap();
    store.put("/flags/ok", br#"{"on":false}"#).await.unwrap();
    wait_until("healthy events", || seen.lock().len() == 2).await;
    assert_eq!(*seen.lock(), vec![1, 2]);
}
