//! Config command implementation.

use std::fs;
use std::path::PathBuf;

use zvm_perf_exporter::Config;

use crate::cli::ConfigFormat;

/// Generates configuration files
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("zvm-perf-exporter.yaml"));

    let content = render_config(&config, format, commented)?;

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

pub fn render_config(
    config: &Config,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => {
            let content = serde_yaml::to_string(config)?;
            if commented {
                add_config_comments(content)
            } else {
                content
            }
        }
    })
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# z/VM Performance Exporter Configuration
# ========================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"                     # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                          # HTTP port
#
# xCAT Management Node
# --------------------
# zvm_xcat_server: "10.0.0.1"         # xCAT MN address (HTTPS)
# zvm_xcat_username: "admin"          # REST API user
# zvm_xcat_password: "secret"         # REST API password (masked in /config)
# zvm_xcat_connection_timeout: 600    # Seconds per xCAT request
# xcat_insecure_tls: false            # Accept self-signed xCAT certificates
#
# z/VM Topology
# -------------
# xcat_zhcp_nodename: "zhcp"          # xCAT node name of the zhcp server
# zvm_host: "zvmhost1"                # Node name of the z/VM host itself
# zvm_xcat_master: "xcat"             # Node name of the xCAT MN
#
# Refresh Timing
# --------------
# cache_update_interval: 600          # Seconds between full cache refreshes
# poll_interval: 60                   # Seconds between exporter poll cycles
#
# Metrics Enable Flags
# --------------------
# enable_cpu: true                    # Export CPU metrics
# enable_memory: true                 # Export memory metrics
# enable_nics: true                   # Export vNIC metrics (one vswitch query)
#
# Feature Flags
# -------------
# enable_health: true                 # Enable /health endpoint
# enable_tls: false                   # Serve HTTPS
# tls_cert_path: null                 # PEM certificate (required with TLS)
# tls_key_path: null                  # PEM private key (required with TLS)
#
# Logging
# -------
# log_level: "info"                   # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commented_yaml_still_parses() {
        let content = render_config(&Config::default(), ConfigFormat::Yaml, true).unwrap();
        assert!(content.starts_with("# z/VM Performance Exporter Configuration"));
        let parsed: Config = serde_yaml::from_str(&content).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_toml_output_parses() {
        let content = render_config(&Config::default(), ConfigFormat::Toml, false).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed.port, Some(9216));
    }

    #[test]
    fn test_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cfg.json");
        command_config(Some(out.clone()), ConfigFormat::Json, false).unwrap();
        let parsed: Config = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(parsed.xcat_zhcp_nodename.as_deref(), Some("zhcp"));
    }
}
