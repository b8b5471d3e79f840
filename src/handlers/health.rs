//! `/health` endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /health endpoint.
///
/// 503 until the first poll cycle succeeds, and again whenever the latest
/// cycle failed.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.health_stats.record_http_request();

    let cache = state.cache.read().await;

    let status = if cache.update_success && cache.last_updated.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = match (&cache.last_error, cache.is_updating) {
        (_, true) if cache.update_success => "OK - Cache updating".to_string(),
        (_, true) => "Cache updating".to_string(),
        (Some(err), false) => format!("Cache update failed: {}", err),
        (None, false) if cache.update_success => "OK".to_string(),
        (None, false) => "No poll completed yet".to_string(),
    };

    let age = cache
        .last_updated
        .map(|t| format!("{}s ago", t.elapsed().as_secs()))
        .unwrap_or_else(|| "never".to_string());
    let table = state.health_stats.render_table(&cache.counters);

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\ninstances: {} exported, {} skipped\nlast poll: {age}\n\n{table}",
            cache.stats.len(),
            cache.skipped
        ),
    )
}
