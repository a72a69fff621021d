//! Watch supervision
//!
//! A registration moves through
//! `Starting -> Streaming -> Faulted -> Starting -> ...` until the process
//! exits or [`WatchSupervisor::shutdown`] is called. There is no terminal
//! failure state: every fault, including a panicking handler, ends in a
//! backoff and a fresh stream.

mod backoff;
mod supervisor;

pub use supervisor::*;
