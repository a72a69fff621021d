//! Configuration Store Error Hierarchy
//!
//! Every fallible operation in the crate returns [`Error`]. One-shot calls
//! surface these directly to the caller; the watch supervisor absorbs them
//! and keeps retrying.

use std::time::Duration;

use config::ConfigError;
use tonic::Code;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The coordination service could not be reached when the store was built.
    /// The store is unusable.
    #[error("Coordination service unavailable at {endpoints:?}: {reason}")]
    ConnectionUnavailable { endpoints: Vec<String>, reason: String },

    /// Caller supplied a key that does not normalize. No remote call was made.
    #[error("Invalid config key {raw:?}: {reason}")]
    InvalidKey { raw: String, reason: &'static str },

    /// Put payload is not a JSON object or array. No remote call was made.
    #[error("Value is not a JSON document: {0}")]
    InvalidValue(String),

    /// One-shot round trip did not finish inside its deadline
    #[error("Remote call {op} timed out after {duration:?}")]
    RemoteTimeout { op: &'static str, duration: Duration },

    /// Transport or server-side failure reported by the coordination client
    #[error("Remote call failed: {0}")]
    RemoteFailure(String),

    /// Watch was re-opened from a revision the service already compacted away
    #[error("Watch start revision compacted, oldest available revision is {compact_revision}")]
    Compacted { compact_revision: i64 },

    /// Stored bytes do not match the requested target shape
    #[error("Failed to decode value at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Typed value could not be serialized before a put
    #[error("Failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    /// Watch registration attempted after the supervisor was shut down
    #[error("Watch supervisor has been shut down")]
    WatchShutdown,

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether the error came from the remote side rather than from the caller's input.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteTimeout { .. } | Error::RemoteFailure(_) | Error::Compacted { .. }
        )
    }
}

impl From<etcd_client::Error> for Error {
    fn from(e: etcd_client::Error) -> Self {
        match e {
            etcd_client::Error::GRpcStatus(status) if status.code() == Code::DeadlineExceeded => {
                Error::RemoteTimeout {
                    op: "grpc",
                    duration: Duration::ZERO,
                }
            }
            etcd_client::Error::GRpcStatus(status) => {
                Error::RemoteFailure(format!("{:?}: {}", status.code(), status.message()))
            }
            other => Error::RemoteFailure(other.to_string()),
        }
    }
}
