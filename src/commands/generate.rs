//! Generate testdata command implementation.
//!
//! Writes a synthetic z/VM environment that `--test-data-file` can serve in
//! place of a real xCAT management node.

use chrono::Utc;
use rand::Rng;
use std::fs;
use std::path::Path;
use tracing::debug;

use zvm_perf_exporter::xcat::testdata::{TestData, TestInstance};
use zvm_perf_exporter::{Config, NicRecord};

/// Guests named like the ones on a typical OpenStack z/VM compute node.
const NODE_PREFIX: &str = "osp";

/// Builds `instances` guests whose NICs are spread over `vswitches`.
pub fn generate_test_data(
    rng: &mut impl Rng,
    instances: usize,
    vswitches: usize,
    config: &Config,
) -> TestData {
    let vswitches = vswitches.max(1);
    let guests = (0..instances)
        .map(|i| {
            let userid = format!("{}{:05}", NODE_PREFIX.to_uppercase(), i + 1);
            // every guest is on the first vswitch, every other one on a second
            let nic_count = if i % 2 == 0 { vswitches.min(2) } else { 1 };
            let nics = (0..nic_count)
                .map(|n| {
                    let vswitch = format!("XCATVSW{}", (i + n) % vswitches + 1);
                    generate_random_nic(&mut *rng, &vswitch, n)
                })
                .collect();
            TestInstance {
                node: userid.to_lowercase(),
                userid,
                // one in ten guests is stopped
                running: rng.gen_range(0..10) != 0,
                guest_cpus: rng.gen_range(1..=8),
                used_cpu_time_us: rng.gen_range(1_000_000..50_000_000_000),
                used_memory_kb: rng.gen_range(512 * 1024..16 * 1024 * 1024),
                nics,
            }
        })
        .collect();

    TestData {
        version: "1.0".to_string(),
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        zhcp_nodename: config.zhcp_nodename().to_string(),
        zhcp_hostname: format!("{}.example.com", config.zhcp_nodename()),
        zhcp_userid: config.zhcp_nodename().to_uppercase(),
        instances: guests,
    }
}

/// Generates synthetic test data JSON file for testing purposes.
pub fn command_generate_testdata(
    output: &Path,
    instances: usize,
    vswitches: usize,
    config: &Config,
) -> anyhow::Result<()> {
    debug!(
        "Generating test data: instances={}, vswitches={}, output={}",
        instances,
        vswitches,
        output.display()
    );

    let test_data = generate_test_data(&mut rand::thread_rng(), instances, vswitches, config);
    let json_content = serde_json::to_string_pretty(&test_data)?;
    fs::write(output, &json_content)?;

    let nic_total: usize = test_data.instances.iter().map(|i| i.nics.len()).sum();
    println!(
        "✅ Generated test data: {} guests with {} NICs in {}",
        test_data.instances.len(),
        nic_total,
        output.display()
    );

    Ok(())
}

/// Random counters with plausible ratios between bytes, frames and errors.
fn generate_random_nic(rng: &mut impl Rng, vswitch: &str, index: usize) -> NicRecord {
    let fr_rx: u64 = rng.gen_range(1_000..5_000_000);
    let fr_tx: u64 = rng.gen_range(1_000..5_000_000);

    // 200-1500 bytes per frame on average
    let rx_ratio: u64 = rng.gen_range(200..1500);
    let tx_ratio: u64 = rng.gen_range(200..1500);

    NicRecord {
        vswitch_name: vswitch.to_string(),
        nic_vdev: format!("{:04X}", 0x0600 + index * 0x100),
        nic_fr_rx: fr_rx,
        nic_fr_rx_dsc: rng.gen_range(0..=fr_rx / 10_000),
        nic_fr_rx_err: rng.gen_range(0..=3),
        nic_fr_tx: fr_tx,
        nic_fr_tx_dsc: rng.gen_range(0..=fr_tx / 10_000),
        nic_fr_tx_err: rng.gen_range(0..=3),
        nic_rx: fr_rx * rx_ratio,
        nic_tx: fr_tx * tx_ratio,
    }
}
