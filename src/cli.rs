//! CLI arguments and subcommands for zvm-perf-exporter.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Output format for `inspect`
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "zvm-perf-exporter",
    about = "Prometheus exporter for z/VM guest CPU, memory and vNIC metrics",
    long_about = "Prometheus exporter for z/VM guest CPU, memory and vNIC metrics.\n\n\
                  Polls an xCAT management node for guest performance data and virtual \
                  switch NIC counters, keeps them in a cache that is fully refreshed every \
                  cache_update_interval seconds, and serves them in Prometheus text format.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Seconds between full cache refreshes (override config)
    #[arg(long)]
    pub cache_update_interval: Option<u64>,

    /// Seconds between exporter poll cycles (override config)
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Serve HTTPS instead of HTTP
    #[arg(long)]
    pub enable_tls: bool,

    /// TLS certificate (PEM)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,

    /// Path to JSON test data file (answers xCAT calls offline)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and xCAT reachability
    Check {
        /// Only validate configuration, do not contact xCAT
        #[arg(long)]
        offline: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Collect stats once and print them
    Inspect {
        /// Only this guest (xCAT node name)
        #[arg(short = 'i', long)]
        instance: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },

    /// Generate synthetic test data JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Number of guests to generate
        #[arg(long, default_value_t = 8)]
        instances: usize,

        /// Number of vswitches the guests' NICs are spread over
        #[arg(long, default_value_t = 2)]
        vswitches: usize,
    },
}
