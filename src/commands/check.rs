//! System check command implementation.
//!
//! Runs on a blocking thread: the xCAT transport drives its requests through
//! the tokio runtime handle.

use std::path::Path;

use zvm_perf_exporter::config::validate_effective_config;
use zvm_perf_exporter::{Config, Instance};

use crate::collector::build_inspector;

/// Validates the configuration and, unless `offline`, walks the same path a
/// poll cycle takes: zhcp lookup, guest enumeration and one guest's data.
pub fn command_check(
    offline: bool,
    config: &Config,
    test_data_file: Option<&Path>,
) -> anyhow::Result<()> {
    println!("🔍 z/VM Performance Exporter - System Check");
    println!("===========================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config, offline || test_data_file.is_some()) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    if offline {
        println!("\n🌐 Skipping xCAT checks (--offline)");
    } else if all_ok {
        all_ok &= check_xcat(config, test_data_file);
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - exporter is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        std::process::exit(1);
    }
}

fn check_xcat(config: &Config, test_data_file: Option<&Path>) -> bool {
    match test_data_file {
        Some(path) => println!("\n🌐 Checking test data {}...", path.display()),
        None => println!(
            "\n🌐 Checking xCAT at {}...",
            config.zvm_xcat_server.as_deref().unwrap_or("<unset>")
        ),
    }

    let mut inspector = match build_inspector(config, test_data_file) {
        Ok(inspector) => inspector,
        Err(e) => {
            println!("   ❌ Cannot set up xCAT client: {}", e);
            return false;
        }
    };

    match inspector.zhcp() {
        Ok(zhcp) => println!(
            "   ✅ zhcp node {} resolved: hostname {}, userid {}",
            zhcp.nodename, zhcp.hostname, zhcp.userid
        ),
        Err(e) => {
            println!("   ❌ zhcp node lookup failed: {}", e);
            return false;
        }
    }

    if let Err(e) = inspector.refresh_all() {
        println!("   ❌ Guest enumeration failed: {}", e);
        return false;
    }
    let guests = inspector.instances().len();
    if guests == 0 {
        println!("   ⚠️  No guests managed by this zhcp node");
        return true;
    }
    println!(
        "   ✅ {} guests enumerated, {} with CPU/memory data",
        guests,
        inspector.cache().len()
    );

    if config.enable_nics() {
        let mut names: Vec<String> = inspector.instances().keys().cloned().collect();
        names.sort();
        let probe = Instance::new(names[0].clone());
        match inspector.inspect_vnics(&probe) {
            Ok(vnics) => println!(
                "   ✅ vswitch counters readable ({} NICs on {})",
                vnics.len(),
                probe.name
            ),
            Err(e) => {
                println!("   ❌ vswitch query failed: {}", e);
                return false;
            }
        }
    }

    true
}
