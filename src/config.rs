//! Exporter configuration.
//!
//! Every field is optional so that a config file only has to name what it
//! changes; the accessors fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ZvmError};
use crate::inspector::InspectorSettings;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_CACHE_UPDATE_INTERVAL: u64 = 600;
pub const DEFAULT_POLL_INTERVAL: u64 = 60;
pub const DEFAULT_CONNECTION_TIMEOUT: u64 = 600;
pub const DEFAULT_ZHCP_NODENAME: &str = "zhcp";
pub const DEFAULT_XCAT_MASTER: &str = "xcat";

/// Searched in order when no config file is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/zvm-perf-exporter/config.yaml",
    "/etc/zvm-perf-exporter/config.yml",
    "/etc/zvm-perf-exporter/config.json",
    "./zvm-perf-exporter.yaml",
    "./zvm-perf-exporter.yml",
    "./zvm-perf-exporter.json",
];

const REDACTED: &str = "********";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // xCAT management node
    #[serde(alias = "zvm-xcat-server")]
    pub zvm_xcat_server: Option<String>,
    #[serde(alias = "zvm-xcat-username")]
    pub zvm_xcat_username: Option<String>,
    #[serde(alias = "zvm-xcat-password")]
    pub zvm_xcat_password: Option<String>,
    /// Seconds.
    #[serde(alias = "zvm-xcat-connection-timeout")]
    pub zvm_xcat_connection_timeout: Option<u64>,
    /// Accept self-signed xCAT certificates.
    pub xcat_insecure_tls: Option<bool>,

    // z/VM topology
    #[serde(alias = "xcat-zhcp-nodename")]
    pub xcat_zhcp_nodename: Option<String>,
    /// Node name of the z/VM host itself, never reported as a guest.
    #[serde(alias = "zvm-host")]
    pub zvm_host: Option<String>,
    #[serde(alias = "zvm-xcat-master")]
    pub zvm_xcat_master: Option<String>,

    // Refresh timing (seconds)
    #[serde(alias = "cache-update-interval")]
    pub cache_update_interval: Option<u64>,
    pub poll_interval: Option<u64>,

    // Metrics enable flags
    pub enable_cpu: Option<bool>,
    pub enable_memory: Option<bool>,
    pub enable_nics: Option<bool>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_tls: Option<bool>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            zvm_xcat_server: None,
            zvm_xcat_username: None,
            zvm_xcat_password: None,
            zvm_xcat_connection_timeout: Some(DEFAULT_CONNECTION_TIMEOUT),
            xcat_insecure_tls: Some(false),
            xcat_zhcp_nodename: Some(DEFAULT_ZHCP_NODENAME.to_string()),
            zvm_host: None,
            zvm_xcat_master: Some(DEFAULT_XCAT_MASTER.to_string()),
            cache_update_interval: Some(DEFAULT_CACHE_UPDATE_INTERVAL),
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
            enable_cpu: Some(true),
            enable_memory: Some(true),
            enable_nics: Some(true),
            enable_health: Some(true),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    pub fn cache_update_interval(&self) -> Duration {
        Duration::from_secs(
            self.cache_update_interval
                .unwrap_or(DEFAULT_CACHE_UPDATE_INTERVAL),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL))
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(
            self.zvm_xcat_connection_timeout
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
        )
    }

    pub fn zhcp_nodename(&self) -> &str {
        self.xcat_zhcp_nodename
            .as_deref()
            .unwrap_or(DEFAULT_ZHCP_NODENAME)
    }

    pub fn xcat_master(&self) -> &str {
        self.zvm_xcat_master.as_deref().unwrap_or(DEFAULT_XCAT_MASTER)
    }

    pub fn enable_cpu(&self) -> bool {
        self.enable_cpu.unwrap_or(true)
    }

    pub fn enable_memory(&self) -> bool {
        self.enable_memory.unwrap_or(true)
    }

    pub fn enable_nics(&self) -> bool {
        self.enable_nics.unwrap_or(true)
    }

    /// The values the inspector is constructed with.
    pub fn inspector_settings(&self) -> InspectorSettings {
        InspectorSettings {
            zhcp_nodename: self.zhcp_nodename().to_string(),
            zvm_host: self.zvm_host.clone().unwrap_or_default(),
            xcat_master: self.xcat_master().to_string(),
            cache_update_interval: self.cache_update_interval(),
            collect_cpumem: self.enable_cpu() || self.enable_memory(),
            collect_nics: self.enable_nics(),
        }
    }

    /// Copy safe to print or serve: the xCAT password is masked.
    pub fn redacted(&self) -> Config {
        let mut cfg = self.clone();
        if cfg.zvm_xcat_password.is_some() {
            cfg.zvm_xcat_password = Some(REDACTED.to_string());
        }
        cfg
    }
}

fn require(value: &Option<String>, name: &str) -> Result<()> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ZvmError::Config(format!("{} must be set", name))),
    }
}

/// Validate effective config (used by --check-config and at startup).
///
/// `offline` is set when a test data file replaces the xCAT service, in
/// which case no connection settings are needed.
pub fn validate_effective_config(cfg: &Config, offline: bool) -> Result<()> {
    if !(cfg.enable_cpu() || cfg.enable_memory() || cfg.enable_nics()) {
        return Err(ZvmError::Config(
            "At least one of enable_cpu/enable_memory/enable_nics must be true".into(),
        ));
    }

    if cfg.cache_update_interval == Some(0) {
        return Err(ZvmError::Config(
            "cache_update_interval must be greater than 0".into(),
        ));
    }
    if cfg.poll_interval == Some(0) {
        return Err(ZvmError::Config("poll_interval must be greater than 0".into()));
    }

    if cfg.enable_tls.unwrap_or(false) && (cfg.tls_cert_path.is_none() || cfg.tls_key_path.is_none())
    {
        return Err(ZvmError::Config(
            "enable_tls is set, but tls_cert_path or tls_key_path is missing".into(),
        ));
    }

    if !offline {
        require(&cfg.zvm_xcat_server, "zvm_xcat_server")?;
        require(&cfg.zvm_xcat_username, "zvm_xcat_username")?;
        require(&cfg.zvm_xcat_password, "zvm_xcat_password")?;
        require(&cfg.zvm_host, "zvm_host")?;
    }

    Ok(())
}

/// Loads `path`, or the first existing default location, choosing the
/// format by extension (YAML unless `.json` or `.toml`). Nothing found
/// yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
        {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path).map_err(|e| {
        ZvmError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let parse_err =
        |e: &dyn std::fmt::Display| ZvmError::Config(format!("{}: {}", path.display(), e));

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content).map_err(|e| parse_err(&e))?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content).map_err(|e| parse_err(&e))?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            let config: Config = serde_yaml::from_str(&content).map_err(|e| parse_err(&e))?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}
