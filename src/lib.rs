//! Live configuration backed by an etcd-compatible coordination service.
//!
//! - [`ConfigStore`] - bounded-deadline get/put/delete plus supervised watches
//! - [`StoreConfig`] - layered configuration (defaults, file, environment)
//! - [`CoordinationClient`] - the remote primitives, implemented by
//!   [`EtcdCoordinator`] and [`MemoryCoordinator`]

mod client;
mod codec;
mod config;
mod constants;
mod errors;
mod metrics;
mod store;
mod watch;

pub use client::*;
pub use codec::*;
pub use self::config::*;
pub use errors::*;
pub use metrics::gather_metrics;
pub use store::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;


//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms100, ObjectivePercentile::P99);
