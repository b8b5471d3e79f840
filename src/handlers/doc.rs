//! `/doc` endpoint: plain-text usage reference.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

#[instrument(skip(state))]
pub async fn doc_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /doc request");
    state.health_stats.record_http_request();

    let port = state.config.port.unwrap_or(zvm_perf_exporter::config::DEFAULT_PORT);
    let doc = format!(
        r#"ZVM PERF EXPORTER - DOCUMENTATION
=================================

VERSION: {version}
DESCRIPTION: Prometheus exporter for z/VM guest CPU, memory and vNIC metrics

HTTP ENDPOINTS
--------------
GET /metrics     - Prometheus metrics endpoint
GET /health      - Poll status, statistics and refresh counters (plain text)
GET /config      - Effective configuration, password masked (plain text)
GET /doc         - This documentation (plain text)

AVAILABLE METRICS
-----------------
zvm_guest_cpus                           - Virtual CPUs per guest
zvm_guest_cpu_time_seconds               - CPU time used per guest
zvm_guest_memory_used_megabytes          - Memory used per guest
zvm_guest_nic_{{receive,transmit}}_bytes   - vNIC traffic per interface
zvm_guest_nic_{{receive,transmit}}_packets - vNIC frames per interface
zvm_guest_nic_{{receive,transmit}}_drop    - vNIC discarded frames
zvm_guest_nic_{{receive,transmit}}_errors  - vNIC errors
zvm_exporter_*                           - Exporter self-metrics

Interfaces are named <vswitch>_<userid>_<vdev>.

DATA FRESHNESS
--------------
Guest data is cached. Every cache_update_interval seconds (default 600)
the guest list is re-read from the xCAT zvm table and CPU/memory data is
reloaded for all guests. vNIC counters are reloaded on the first poll
after each such refresh. Guests missing between refreshes are looked up
individually.

CLI COMMANDS
------------
zvm-perf-exporter                          - Start the exporter
zvm-perf-exporter check                    - Validate config and reach xCAT
zvm-perf-exporter config -o config.yaml    - Generate config file
zvm-perf-exporter inspect -i <node>        - Collect once and print
zvm-perf-exporter generate-testdata        - Write an offline data file
zvm-perf-exporter -t testdata.json         - Serve from an offline data file

PROMETHEUS SCRAPE CONFIG
------------------------
scrape_configs:
  - job_name: 'zvm'
    static_configs:
      - targets: ['localhost:{port}']
    scrape_interval: 60s
"#,
        version = env!("CARGO_PKG_VERSION"),
        port = port,
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        doc,
    )
}
