use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use etcd_client::Client;
use etcd_client::ConnectOptions;
use etcd_client::Event;
use etcd_client::EventType;
use etcd_client::ResponseHeader;
use etcd_client::WatchOptions;
use etcd_client::WatchResponse;
use futures::stream;
use futures::StreamExt;
use tonic::async_trait;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::ChangeEvent;
use super::CoordinationClient;
use super::WatchFeed;
use crate::ConfigKey;
use crate::ConnectionConfig;
use crate::Error;
use crate::Result;

/// etcd v3 backed coordination client
///
/// `etcd_client::Client` is a cheap clone over one shared tonic channel, so
/// every call takes its own copy of the kv/watch sub-client and no lock is
/// needed for concurrent use.
#[derive(Clone)]
pub struct EtcdCoordinator {
    client: Client,
    endpoints: Vec<String>,
    /// Highest header revision seen on any response, `0` before the first one
    observed: Arc<AtomicI64>,
}

impl EtcdCoordinator {
    /// Connects to the cluster listed in `config.endpoints`.
    ///
    /// A failure here is terminal: the caller gets
    /// [`Error::ConnectionUnavailable`] and no coordinator.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(config.connect_timeout())
            .with_keep_alive(config.keep_alive_interval(), config.keep_alive_timeout());
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options = options.with_user(user.clone(), password.clone());
        }

        let client = Client::connect(config.endpoints.clone(), Some(options))
            .await
            .map_err(|e| {
                error!("connect to {:?} failed: {}", config.endpoints, e);
                Error::ConnectionUnavailable {
                    endpoints: config.endpoints.clone(),
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
            observed: Arc::new(AtomicI64::new(0)),
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn observe(
        &self,
        header: Option<&ResponseHeader>,
    ) -> Option<i64> {
        let revision = header?.revision();
        self.observed.fetch_max(revision, Ordering::AcqRel);
        Some(revision)
    }
}

#[async_trait]
impl CoordinationClient for EtcdCoordinator {
    async fn get(
        &self,
        key: &ConfigKey,
    ) -> Result<Option<Vec<u8>>> {
        let mut kv = self.client.kv_client();
        let resp = kv.get(key.as_str(), None).await?;
        self.observe(resp.header());
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn put(
        &self,
        key: &ConfigKey,
        value: Vec<u8>,
    ) -> Result<()> {
        let mut kv = self.client.kv_client();
        let resp = kv.put(key.as_str(), value, None).await?;
        self.observe(resp.header());
        Ok(())
    }

    async fn delete(
        &self,
        key: &ConfigKey,
    ) -> Result<()> {
        let mut kv = self.client.kv_client();
        let resp = kv.delete(key.as_str(), None).await?;
        self.observe(resp.header());
        debug!("delete {}: {} key(s) removed", key, resp.deleted());
        Ok(())
    }

    async fn watch(
        &self,
        key: &ConfigKey,
        start_revision: Option<i64>,
    ) -> Result<WatchFeed> {
        // etcd swallows the created response, so a stream without a start
        // revision would have no known anchor. Pin it to the current revision.
        let start_revision = match start_revision {
            Some(revision) => revision,
            None => {
                let resp = self.client.kv_client().get(key.as_str(), None).await?;
                let current = self.observe(resp.header()).ok_or_else(|| {
                    Error::RemoteFailure(format!("no revision header reading {key}"))
                })?;
                current + 1
            }
        };
        let options = WatchOptions::new().with_start_revision(start_revision);

        let mut watch_client = self.client.watch_client();
        let (watcher, watch_stream) = watch_client.watch(key.as_str(), Some(options)).await?;
        debug!("watch stream established for {} (watch id {})", key, watcher.watch_id());

        let key = key.clone();
        // The watcher must stay alive for as long as the stream is consumed;
        // dropping it closes the request side of the gRPC stream.
        let events = stream::unfold(Some((watcher, watch_stream)), move |state| {
            let key = key.clone();
            async move {
                let (watcher, mut watch_stream) = match state {
                    Some(state) => state,
                    None => return None,
                };
                match watch_stream.message().await {
                    Ok(Some(resp)) => match convert_response(&key, &resp) {
                        Ok(batch) => Some((batch, Some((watcher, watch_stream)))),
                        Err(e) => Some((vec![Err(e)], None)),
                    },
                    Ok(None) => {
                        debug!("watch stream for {} closed by server", key);
                        None
                    }
                    Err(e) => {
                        warn!("watch stream for {} failed: {}", key, e);
                        Some((vec![Err(e.into())], None))
                    }
                }
            }
        });

        Ok(WatchFeed {
            anchor_revision: start_revision - 1,
            events: events.flat_map(stream::iter).boxed(),
        })
    }

    fn observed_revision(&self) -> Option<i64> {
        match self.observed.load(Ordering::Acquire) {
            0 => None,
            revision => Some(revision),
        }
    }
}

fn convert_response(
    key: &ConfigKey,
    resp: &WatchResponse,
) -> Result<Vec<Result<ChangeEvent>>> {
    if resp.canceled() {
        if resp.compact_revision() > 0 {
            return Err(Error::Compacted {
                compact_revision: resp.compact_revision(),
            });
        }
        return Err(Error::RemoteFailure(format!(
            "watch on {} canceled by server: {}",
            key,
            resp.cancel_reason()
        )));
    }

    Ok(resp
        .events()
        .iter()
        .filter_map(|event| convert_event(key, event))
        .map(Ok)
        .collect())
}

fn convert_event(
    key: &ConfigKey,
    event: &Event,
) -> Option<ChangeEvent> {
    let kv = event.kv()?;
    let revision = kv.mod_revision();
    match event.event_type() {
        EventType::Put => Some(ChangeEvent::Put {
            key: key.clone(),
            value: kv.value().to_vec(),
            revision,
        }),
        EventType::Delete => Some(ChangeEvent::Delete {
            key: key.clone(),
            revision,
        }),
    }
}
