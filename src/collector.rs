//! Inspector construction and the poll cycle behind the cache snapshot.

use anyhow::anyhow;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};

use zvm_perf_exporter::xcat::testdata::{load_test_data_from_file, TestDataTransport};
use zvm_perf_exporter::xcat::{HttpTransport, XcatClient, XcatTransport, XcatUrl};
use zvm_perf_exporter::{Config, Inspector};

use crate::state::SharedState;

/// Builds an inspector over HTTPS, or over a test data file when one is
/// given. Must run inside a tokio runtime.
pub fn build_inspector(
    config: &Config,
    test_data_file: Option<&Path>,
) -> anyhow::Result<Inspector> {
    let transport: Box<dyn XcatTransport> = match test_data_file {
        Some(path) => {
            let data = load_test_data_from_file(path)?;
            info!("Using test data from {} instead of xCAT", path.display());
            Box::new(TestDataTransport::new(data))
        }
        None => {
            let server = config
                .zvm_xcat_server
                .as_deref()
                .ok_or_else(|| anyhow!("zvm_xcat_server is not set"))?;
            debug!("Using xCAT server {}", server);
            Box::new(HttpTransport::new(
                server,
                config.connection_timeout(),
                config.xcat_insecure_tls.unwrap_or(false),
            )?)
        }
    };

    let url = XcatUrl::new(
        config.zvm_xcat_username.as_deref().unwrap_or_default(),
        config.zvm_xcat_password.as_deref().unwrap_or_default(),
    );
    Ok(Inspector::new(
        XcatClient::new(transport, url),
        config.inspector_settings(),
    ))
}

/// Runs one poll cycle on a blocking thread and swaps the snapshot in.
pub async fn update_cache(state: &SharedState) -> anyhow::Result<()> {
    let start = Instant::now();
    debug!("Starting poll cycle");

    {
        let mut cache = state.cache.write().await;
        cache.is_updating = true;
        state.exporter.cache_updating.set(1.0);
    }

    let inspector = state.inspector.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut inspector = inspector
            .lock()
            .map_err(|_| anyhow!("inspector lock poisoned"))?;
        let report = inspector.poll_all()?;
        Ok::<_, anyhow::Error>((report, inspector.counters()))
    })
    .await
    .unwrap_or_else(|e| Err(anyhow!("poll task panicked: {}", e)));

    let duration = start.elapsed().as_secs_f64();
    let mut cache = state.cache.write().await;
    cache.is_updating = false;
    cache.update_duration_seconds = duration;
    state.exporter.cache_updating.set(0.0);

    match result {
        Ok((report, counters)) => {
            let polled = report.stats.len();
            cache.stats = report.stats;
            cache.skipped = report.skipped;
            cache.counters = counters;
            cache.last_updated = Some(start);
            cache.update_success = true;
            cache.last_error = None;
            drop(cache);

            state
                .health_stats
                .record_poll(polled as u64, report.skipped as u64, duration);
            info!(
                "Poll cycle completed: {} instances, {} skipped, {:.2}ms",
                polled,
                report.skipped,
                duration * 1000.0
            );
            Ok(())
        }
        Err(e) => {
            // keep the previous stats; they are still the best we have
            cache.update_success = false;
            cache.last_error = Some(e.to_string());
            drop(cache);

            state.health_stats.record_failed_poll();
            error!("Poll cycle failed after {:.2}ms: {}", duration * 1000.0, e);
            Err(e)
        }
    }
}
