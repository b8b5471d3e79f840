//! zvm-perf-exporter - Prometheus exporter for z/VM guest performance data.
//!
//! Polls an xCAT management node for per-guest CPU, memory and virtual NIC
//! counters and serves the last poll result on `/metrics`.

use axum::{routing::get, Router};
use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::{net::TcpListener, signal, sync::RwLock, time::interval};
use tracing::{debug, error, info, warn, Level};

use zvm_perf_exporter::config::{
    load_config, validate_effective_config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use zvm_perf_exporter::Config;

mod cli;
mod collector;
mod commands;
mod handlers;
mod health_stats;
mod metrics;
mod state;

use cli::{Args, Commands, ConfigFormat, LogLevel};
use collector::{build_inspector, update_cache};
use commands::{command_check, command_config, command_generate_testdata, command_inspect};
use handlers::{config_handler, doc_handler, health_handler, metrics_handler};
use health_stats::HealthStats;
use metrics::{ExporterMetrics, VmMetrics};
use state::{AppState, MetricsCache};

/// Effective configuration: CLI > config file > defaults.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(secs) = args.cache_update_interval {
        config.cache_update_interval = Some(secs);
    }
    if let Some(secs) = args.poll_interval {
        config.poll_interval = Some(secs);
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert) = &args.tls_cert {
        config.tls_cert_path = Some(cert.clone());
    }
    if let Some(key) = &args.tls_key {
        config.tls_key_path = Some(key.clone());
    }

    config.log_level = Some(format!("{:?}", args.log_level).to_lowercase());

    Ok(config)
}

/// Shows configuration in requested format
fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    let config = config.redacted();
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(&config)?,
    };

    println!("{output}");
    Ok(())
}

fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR, // Off not fully supported, use ERROR as minimal
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Runs a subcommand on a blocking thread; the xCAT client blocks on the
/// runtime handle and must not run on an async worker.
async fn run_command(
    command: Commands,
    config: Config,
    test_data_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || match command {
        Commands::Check { offline } => command_check(offline, &config, test_data_file.as_deref()),
        Commands::Config {
            output,
            format,
            commented,
        } => command_config(output, format, commented),
        Commands::Inspect { instance, format } => command_inspect(
            instance.as_deref(),
            format,
            &config,
            test_data_file.as_deref(),
        ),
        Commands::GenerateTestdata {
            output,
            instances,
            vswitches,
        } => command_generate_testdata(&output, instances, vswitches, &config),
    })
    .await?
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// -------------------------------------------------------------------
/// MAIN APPLICATION ENTRY POINT
/// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = Args::parse();
    let offline = args.test_data_file.is_some();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config, offline) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Subcommands print to stdout and run without the log subscriber
    if let Some(command) = args.command.take() {
        let config = resolve_config(&args)?;
        return run_command(command, config, args.test_data_file.clone()).await;
    }

    let config = resolve_config(&args)?;
    if let Err(e) = validate_effective_config(&config, offline) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&args);

    info!("Starting zvm-perf-exporter");

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let registry = Registry::new();
    let metrics = VmMetrics::new(&registry)?;
    let exporter = ExporterMetrics::new(&registry)?;
    debug!("All metrics registered successfully");

    let inspector = build_inspector(&config, args.test_data_file.as_deref())?;
    let health_stats = Arc::new(HealthStats::new());
    let state = Arc::new(AppState {
        registry,
        metrics,
        exporter,
        cache: Arc::new(RwLock::new(MetricsCache::default())),
        inspector: Arc::new(Mutex::new(inspector)),
        config: Arc::new(config.clone()),
        health_stats,
    });

    info!("Performing initial poll");
    if let Err(e) = update_cache(&state).await {
        error!("Initial poll failed: {}", e);
    } else {
        info!("Initial poll completed successfully");
    }

    let bg_state = state.clone();
    let poll_every = config.poll_interval();
    let background_task = tokio::spawn(async move {
        let mut int = interval(poll_every);
        // the first tick fires immediately and the initial poll already ran
        int.tick().await;
        debug!(
            "Background poll task started with {}s interval",
            poll_every.as_secs()
        );

        loop {
            int.tick().await;
            debug!("Starting scheduled poll");
            if let Err(e) = update_cache(&bg_state).await {
                error!("Scheduled poll failed: {}", e);
            }
        }
    });

    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/config", get(config_handler))
        .route("/doc", get(doc_handler));
    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }
    let app = app.with_state(state.clone());

    let tls_paths = if config.enable_tls.unwrap_or(false) {
        config.tls_cert_path.clone().zip(config.tls_key_path.clone())
    } else {
        None
    };

    let result = match tls_paths {
        Some((cert, key)) => {
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert, &key).await?;
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_handle.graceful_shutdown(None);
            });

            info!("zvm-perf-exporter listening on https://{}:{}", bind_ip_str, port);
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            let listener = TcpListener::bind(addr).await?;
            info!("zvm-perf-exporter listening on http://{}:{}", bind_ip_str, port);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        }
    };

    background_task.abort();
    let _ = background_task.await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    if state.health_stats.failed_polls() > 0 {
        warn!(
            "{} poll cycles failed during this run",
            state.health_stats.failed_polls()
        );
    }
    info!("zvm-perf-exporter stopped gracefully");
    Ok(())
}
