use std::any::Any;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::backoff::Backoff;
use crate::metrics::ACTIVE_WATCHES;
use crate::metrics::WATCH_EVENTS_DELIVERED;
use crate::metrics::WATCH_HANDLER_FAULTS;
use crate::metrics::WATCH_RESTARTS;
use crate::ChangeEvent;
use crate::ChangeStream;
use crate::ConfigKey;
use crate::CoordinationClient;
use crate::Error;
use crate::Result;
use crate::WatchConfig;

/// Lifecycle of a single watch registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Opening a new stream
    Starting,
    /// Stream open, events flow to the handler
    Streaming,
    /// Last stream or handler failed; waiting out the backoff
    Faulted,
}

/// Point-in-time view of one registration
#[derive(Debug, Clone)]
pub struct RegistrationStatus {
    pub id: String,
    pub key: ConfigKey,
    pub state: WatchState,
    /// Streams re-opened after a fault
    pub restarts: u64,
    /// Events handed to the handler without panicking
    pub delivered: u64,
    /// Last revision seen on this key
    pub last_revision: Option<i64>,
}

/// Owns the background task of every watch registration.
///
/// Each registration runs its own loop; a fault in one key's stream never
/// touches another registration. The loop catches everything, including
/// handler panics, and re-opens the stream from the revision after the last
/// one it saw, so it never gives up and never reorders events.
pub struct WatchSupervisor<C> {
    client: Arc<C>,
    config: WatchConfig,
    runtime: Handle,
    shutdown: CancellationToken,
    registrations: Arc<DashMap<String, RegistrationStatus>>,
}

impl<C> WatchSupervisor<C>
where
    C: CoordinationClient,
{
    pub fn new(
        client: Arc<C>,
        config: WatchConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            client,
            config,
            runtime,
            shutdown: CancellationToken::new(),
            registrations: Arc::new(DashMap::new()),
        }
    }

    /// Spawns the background loop for `key` and returns without waiting for
    /// the stream to open.
    ///
    /// `handler` runs inline on the runtime's worker thread and must not block.
    pub fn register<F>(
        &self,
        key: ConfigKey,
        handler: F,
    ) -> Result<String>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(Error::WatchShutdown);
        }

        let id = nanoid::nanoid!();
        self.registrations.insert(
            id.clone(),
            RegistrationStatus {
                id: id.clone(),
                key: key.clone(),
                state: WatchState::Starting,
                restarts: 0,
                delivered: 0,
                last_revision: None,
            },
        );
        ACTIVE_WATCHES.with_label_values(&[key.as_str()]).inc();

        // Changes made after this call returns must reach the handler even if
        // the first stream takes several attempts to open.
        let start_revision = self.client.observed_revision().map(|revision| revision + 1);

        let registration = Registration {
            id: id.clone(),
            key,
            start_revision,
            handler,
            client: self.client.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.child_token(),
            registrations: self.registrations.clone(),
        };
        self.runtime.spawn(registration.run());

        Ok(id)
    }

    pub fn status(&self) -> Vec<RegistrationStatus> {
        let mut all: Vec<RegistrationStatus> =
            self.registrations.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Distinct keys with at least one live registration
    pub fn watched_keys(&self) -> Vec<ConfigKey> {
        let mut keys: Vec<ConfigKey> = self.registrations.iter().map(|r| r.key.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Stops every registration at its next suspension point and refuses
    /// new ones.
    pub fn shutdown(&self) {
        info!("shutting down {} watch registration(s)", self.registrations.len());
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[derive(Debug)]
enum Fault {
    Open(Error),
    Stream(Error),
    Closed,
    Handler { revision: i64, message: String },
}

struct Registration<C, F> {
    id: String,
    key: ConfigKey,
    start_revision: Option<i64>,
    handler: F,
    client: Arc<C>,
    config: WatchConfig,
    shutdown: CancellationToken,
    registrations: Arc<DashMap<String, RegistrationStatus>>,
}

impl<C, F> Registration<C, F>
where
    C: CoordinationClient,
    F: FnMut(ChangeEvent) + Send + 'static,
{
    async fn run(mut self) {
        debug!("[watch {}] supervising {}", self.id, self.key);
        let mut backoff = Backoff::new(self.config.base_delay(), self.config.max_delay());
        let mut resume_from = self.start_revision;

        loop {
            self.set_state(WatchState::Starting);
            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                opened = self.client.watch(&self.key, resume_from) => opened,
            };

            let fault = match opened {
                Ok(feed) => {
                    self.set_state(WatchState::Streaming);
                    if resume_from.is_none() {
                        resume_from = Some(feed.anchor_revision + 1);
                    }
                    let started = Instant::now();
                    let fault = match self.stream_events(feed.events, &mut resume_from).await {
                        Some(fault) => fault,
                        None => break,
                    };
                    if started.elapsed() >= self.config.stable_after() {
                        backoff.reset();
                    }
                    fault
                }
                Err(e) => Fault::Open(e),
            };

            self.set_state(WatchState::Faulted);
            if let Fault::Open(Error::Compacted { compact_revision })
            | Fault::Stream(Error::Compacted { compact_revision }) = &fault
            {
                warn!(
                    "[watch {}] {} history compacted, resuming from oldest retained revision {}",
                    self.id, self.key, compact_revision
                );
                resume_from = Some(*compact_revision);
            }

            let delay = backoff.next_delay();
            warn!(
                "[watch {}] {} faulted: {:?}; restarting in {:?} from revision {:?}",
                self.id, self.key, fault, delay, resume_from
            );
            WATCH_RESTARTS.with_label_values(&[self.key.as_str()]).inc();
            if let Some(mut status) = self.registrations.get_mut(&self.id) {
                status.restarts += 1;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.registrations.remove(&self.id);
        ACTIVE_WATCHES.with_label_values(&[self.key.as_str()]).dec();
        info!("[watch {}] {} stopped", self.id, self.key);
    }

    /// Feeds events to the handler until the stream faults.
    /// Returns `None` once shutdown is requested.
    async fn stream_events(
        &mut self,
        mut stream: ChangeStream,
        resume_from: &mut Option<i64>,
    ) -> Option<Fault> {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                next = stream.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Some(Fault::Stream(e)),
                None => return Some(Fault::Closed),
            };

            // The event counts as consumed even if the handler panics, a
            // restart must not hand it out a second time.
            let revision = event.revision();
            let kind = event.kind();
            *resume_from = Some(revision + 1);
            self.update_status(|status| status.last_revision = Some(revision));

            let handler = &mut self.handler;
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => {
                    WATCH_EVENTS_DELIVERED
                        .with_label_values(&[self.key.as_str(), kind])
                        .inc();
                    self.update_status(|status| status.delivered += 1);
                }
                Err(payload) => {
                    WATCH_HANDLER_FAULTS.with_label_values(&[self.key.as_str()]).inc();
                    return Some(Fault::Handler {
                        revision,
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
        }
    }

    fn set_state(
        &self,
        state: WatchState,
    ) {
        self.update_status(|status| status.state = state);
    }

    fn update_status(
        &self,
        f: impl FnOnce(&mut RegistrationStatus),
    ) {
        if let Some(mut status) = self.registrations.get_mut(&self.id) {
            f(status.value_mut());
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
