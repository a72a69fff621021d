use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use futures::future;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tonic::async_trait;
use tracing::debug;

use super::ChangeEvent;
use super::CoordinationClient;
use super::WatchFeed;
use crate::ConfigKey;
use crate::Error;
use crate::Result;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// In-process coordination service
///
/// Keeps a single revision counter and the full change history, so watches
/// opened with a start revision replay exactly like etcd does. Fault
/// injection hooks let callers reproduce remote outages, severed streams and
/// compaction without a real cluster.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct MemoryCoordinator {
    inner: Arc<Mutex<MemoryState>>,
}

struct MemoryState {
    revision: i64,
    data: HashMap<ConfigKey, Vec<u8>>,
    history: Vec<ChangeEvent>,
    compacted_through: i64,
    events: broadcast::Sender<ChangeEvent>,
    unavailable: bool,
    failing_watches: HashSet<ConfigKey>,
    watch_attempts: HashMap<ConfigKey, usize>,
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                revision: 0,
                data: HashMap::new(),
                history: Vec::new(),
                compacted_through: 0,
                events,
                unavailable: false,
                failing_watches: HashSet::new(),
                watch_attempts: HashMap::new(),
            })),
        }
    }

    /// Latest revision handed out
    pub fn current_revision(&self) -> i64 {
        self.inner.lock().revision
    }

    /// Makes every call fail with [`Error::RemoteFailure`] until reset
    pub fn set_unavailable(
        &self,
        unavailable: bool,
    ) {
        self.inner.lock().unavailable = unavailable;
    }

    /// Makes new watch streams on `key` fail to open
    pub fn fail_watches_on(
        &self,
        key: &ConfigKey,
    ) {
        self.inner.lock().failing_watches.insert(key.clone());
    }

    pub fn restore_watches_on(
        &self,
        key: &ConfigKey,
    ) {
        self.inner.lock().failing_watches.remove(key);
    }

    /// Number of watch streams requested for `key`, successful or not
    pub fn watch_attempts(
        &self,
        key: &ConfigKey,
    ) -> usize {
        self.inner.lock().watch_attempts.get(key).copied().unwrap_or(0)
    }

    /// Ends every open watch stream, as if the server dropped them.
    /// Events already queued on a stream are still delivered first.
    pub fn disconnect_watchers(&self) {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let old = std::mem::replace(&mut self.inner.lock().events, events);
        debug!("disconnecting {} watch stream(s)", old.receiver_count());
    }

    /// Discards history up to and including `revision`
    pub fn compact(
        &self,
        revision: i64,
    ) {
        let mut state = self.inner.lock();
        state.history.retain(|event| event.revision() > revision);
        state.compacted_through = state.compacted_through.max(revision);
    }

    fn ensure_available(state: &MemoryState) -> Result<()> {
        if state.unavailable {
            return Err(Error::RemoteFailure("memory coordinator unavailable".into()));
        }
        Ok(())
    }

    fn record(
        state: &mut MemoryState,
        event: ChangeEvent,
    ) {
        state.history.push(event.clone());
        // No subscribers is fine
        let _ = state.events.send(event);
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordinator {
    async fn get(
        &self,
        key: &ConfigKey,
    ) -> Result<Option<Vec<u8>>> {
        let state = self.inner.lock();
        Self::ensure_available(&state)?;
        Ok(state.data.get(key).cloned())
    }

    async fn put(
        &self,
        key: &ConfigKey,
        value: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.inner.lock();
        Self::ensure_available(&state)?;

        state.revision += 1;
        let revision = state.revision;
        state.data.insert(key.clone(), value.clone());
        Self::record(
            &mut state,
            ChangeEvent::Put {
                key: key.clone(),
                value,
                revision,
            },
        );
        Ok(())
    }

    async fn delete(
        &self,
        key: &ConfigKey,
    ) -> Result<()> {
        let mut state = self.inner.lock();
        Self::ensure_available(&state)?;

        if state.data.remove(key).is_none() {
            return Ok(());
        }

        state.revision += 1;
        let revision = state.revision;
        Self::record(
            &mut state,
            ChangeEvent::Delete {
                key: key.clone(),
                revision,
            },
        );
        Ok(())
    }

    async fn watch(
        &self,
        key: &ConfigKey,
        start_revision: Option<i64>,
    ) -> Result<WatchFeed> {
        let mut state = self.inner.lock();
        *state.watch_attempts.entry(key.clone()).or_insert(0) += 1;

        Self::ensure_available(&state)?;
        if state.failing_watches.contains(key) {
            return Err(Error::RemoteFailure(format!("watch on {key} refused")));
        }

        let backlog: Vec<Result<ChangeEvent>> = match start_revision {
            Some(start) if start <= state.compacted_through => {
                return Err(Error::Compacted {
                    compact_revision: state.compacted_through + 1,
                });
            }
            Some(start) => state
                .history
                .iter()
                .filter(|event| event.key() == key && event.revision() >= start)
                .cloned()
                .map(Ok)
                .collect(),
            None => Vec::new(),
        };

        // Subscribing under the same lock as the backlog snapshot leaves no gap
        let floor = match start_revision {
            Some(start) => state.revision.max(start - 1),
            None => state.revision,
        };
        let anchor_revision = match start_revision {
            Some(start) => start - 1,
            None => state.revision,
        };
        let rx = state.events.subscribe();
        drop(state);

        let key = key.clone();
        let live = BroadcastStream::new(rx).filter_map(move |item| {
            let next = match item {
                Ok(event) if event.key() == &key && event.revision() > floor => Some(Ok(event)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    Some(Err(Error::RemoteFailure(format!("watch on {key} lagged by {n} events"))))
                }
            };
            future::ready(next)
        });

        Ok(WatchFeed {
            anchor_revision,
            events: stream::iter(backlog).chain(live).boxed(),
        })
    }

    fn observed_revision(&self) -> Option<i64> {
        Some(self.inner.lock().revision)
    }
}
