//! z/VM guest performance collection through an xCAT management node.
//!
//! The library holds the response decoders, the merged per-instance stat
//! cache and the [`Inspector`](inspector::Inspector) that decides when the
//! cache has to be refreshed. The `zvm-perf-exporter` binary wraps it in a
//! Prometheus endpoint.

pub mod cache;
pub mod config;
pub mod error;
pub mod inspector;
pub mod parser;
pub mod stats;
pub mod xcat;

pub use cache::InstanceStatCache;
pub use config::Config;
pub use error::{Result, ZvmError};
pub use inspector::{
    Inspector, InspectorSettings, Instance, MetricKind, PollReport, RefreshCounters,
};
pub use stats::{CpuMemRecord, InstanceStat, NicRecord};
