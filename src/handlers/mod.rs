//! HTTP endpoint handlers: `/metrics`, `/health`, `/config` and `/doc`.

pub mod config;
pub mod doc;
pub mod health;
pub mod metrics;

pub use config::config_handler;
pub use doc::doc_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
