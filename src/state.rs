//! Application state shared by the HTTP handlers and the poll task.

use prometheus::Registry;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::RwLock;

use zvm_perf_exporter::{Config, Inspector, InstanceStat, RefreshCounters};

use crate::health_stats::HealthStats;
use crate::metrics::{ExporterMetrics, VmMetrics};

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Result of the last poll cycle, served by `/metrics` and `/health`.
#[derive(Clone, Default)]
pub struct MetricsCache {
    pub stats: Vec<InstanceStat>,
    pub skipped: usize,
    pub counters: RefreshCounters,
    pub last_updated: Option<Instant>,
    pub update_duration_seconds: f64,
    pub update_success: bool,
    pub is_updating: bool,
    pub last_error: Option<String>,
}

pub struct AppState {
    pub registry: Registry,
    pub metrics: VmMetrics,
    pub exporter: ExporterMetrics,
    pub cache: Arc<RwLock<MetricsCache>>,
    /// Check-then-refresh must not interleave, so every inspector call
    /// holds this lock.
    pub inspector: Arc<Mutex<Inspector>>,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
}
