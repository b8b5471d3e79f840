//! `/metrics` endpoint: renders the last poll result in Prometheus text
//! format.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");
    state.health_stats.record_http_request();

    // Polls swap the snapshot under a short write lock, so the last
    // complete result is always readable.
    let cache = state.cache.read().await.clone();

    state.metrics.reset();
    for stat in &cache.stats {
        state.metrics.set_for_instance(stat, &state.config);
    }

    let exporter = &state.exporter;
    exporter.instances_total.set(cache.stats.len() as f64);
    exporter
        .cache_update_duration
        .set(cache.update_duration_seconds);
    exporter
        .cache_update_success
        .set(if cache.update_success { 1.0 } else { 0.0 });
    exporter
        .cache_updating
        .set(if cache.is_updating { 1.0 } else { 0.0 });
    exporter.full_refreshes.set(cache.counters.full as f64);
    exporter
        .targeted_refreshes
        .set(cache.counters.targeted as f64);
    exporter.nic_refreshes.set(cache.counters.nics as f64);

    let scrape_seconds = start.elapsed().as_secs_f64();
    exporter.scrape_duration.set(scrape_seconds);
    state.health_stats.record_scrape(scrape_seconds);

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    TextEncoder::new()
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(|e| {
            error!("Failed to encode metrics: {}", e);
            MetricsError::EncodingFailed
        })?;

    debug!(
        "Served {} instances in {:.2}ms",
        cache.stats.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    String::from_utf8(buffer).map_err(|e| {
        error!("Metrics output is not UTF-8: {}", e);
        MetricsError::EncodingFailed
    })
}
