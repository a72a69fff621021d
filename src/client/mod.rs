//! Coordination service client seam
//!
//! [`CoordinationClient`] is the narrow set of primitives the store needs:
//! - one-shot `get` / `put` / `delete`
//! - a `watch` stream of [`ChangeEvent`]s for a single key
//!
//! Two implementations ship with the crate:
//! - [`EtcdCoordinator`] - production client speaking etcd v3 gRPC
//! - [`MemoryCoordinator`] - in-process store with revision history, for
//!   tests and local development
//!
//! Implementations do not enforce deadlines themselves; the store wraps every
//! one-shot call in its own bounded timeout.

mod etcd;
mod memory;

pub use etcd::*;
pub use memory::*;


use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::ConfigKey;
use crate::Result;

/// Stream of change events for one key.
///
/// Yields `Err` when the remote side reports a problem; ends when the remote
/// side closes the stream. Either way the consumer must open a new one.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent>>;

/// An open change stream and the revision it is anchored at
///
/// The stream yields every change on the key made after `anchor_revision`.
pub struct WatchFeed {
    pub anchor_revision: i64,
    pub events: ChangeStream,
}

/// A single change observed on a watched key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Key was created or updated
    Put {
        key: ConfigKey,
        value: Vec<u8>,
        /// Modification revision assigned by the service
        revision: i64,
    },
    /// Key was deleted
    Delete { key: ConfigKey, revision: i64 },
}

impl ChangeEvent {
    pub fn key(&self) -> &ConfigKey {
        match self {
            ChangeEvent::Put { key, .. } | ChangeEvent::Delete { key, .. } => key,
        }
    }

    pub fn revision(&self) -> i64 {
        match self {
            ChangeEvent::Put { revision, .. } | ChangeEvent::Delete { revision, .. } => *revision,
        }
    }

    /// New value for puts, `None` for deletes
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            ChangeEvent::Put { value, .. } => Some(value),
            ChangeEvent::Delete { .. } => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Put { .. } => "put",
            ChangeEvent::Delete { .. } => "delete",
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Reads the current value. `Ok(None)` when the key does not exist.
    async fn get(
        &self,
        key: &ConfigKey,
    ) -> Result<Option<Vec<u8>>>;

    /// Replaces the value at `key` in a single remote transaction.
    async fn put(
        &self,
        key: &ConfigKey,
        value: Vec<u8>,
    ) -> Result<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(
        &self,
        key: &ConfigKey,
    ) -> Result<()>;

    /// Opens a change stream for exactly `key`.
    ///
    /// With `start_revision` set, events from that revision onwards are
    /// replayed first and the feed is anchored at `start_revision - 1`;
    /// otherwise it is anchored at the revision current when the stream was
    /// established.
    async fn watch(
        &self,
        key: &ConfigKey,
        start_revision: Option<i64>,
    ) -> Result<WatchFeed>;

    /// Highest store revision this client has observed so far, if any.
    ///
    /// Must not block: watch registration reads it synchronously.
    fn observed_revision(&self) -> Option<i64> {
        None
    }
}
