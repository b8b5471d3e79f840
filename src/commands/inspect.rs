//! Inspect command implementation: one collection, printed.

use serde::Serialize;
use std::path::Path;
use tracing::debug;

use zvm_perf_exporter::{
    Config, Inspector, Instance, InstanceStat, MetricKind, RefreshCounters, ZvmError,
};

use crate::cli::OutputFormat;
use crate::collector::build_inspector;

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub instances: Vec<InstanceStat>,
    pub skipped: usize,
    pub refreshes: RefreshCounters,
}

/// Collects once, through the same inspector the server uses, and prints
/// the stats. Must run on a blocking thread.
pub fn command_inspect(
    instance: Option<&str>,
    format: OutputFormat,
    config: &Config,
    test_data_file: Option<&Path>,
) -> anyhow::Result<()> {
    let mut inspector = build_inspector(config, test_data_file)?;
    let report = collect(&mut inspector, instance)?;

    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Yaml => serde_yaml::to_string(&report)?,
    };
    println!("{output}");
    Ok(())
}

pub fn collect(inspector: &mut Inspector, instance: Option<&str>) -> anyhow::Result<InspectReport> {
    let (instances, skipped) = match instance {
        None => {
            let poll = inspector.poll_all()?;
            (poll.stats, poll.skipped)
        }
        Some(name) => {
            let instance = Instance::new(name);
            let mut stat = None;
            for kind in kinds(inspector) {
                match inspector.get_stat(kind, &instance) {
                    Ok(s) => stat = Some(s),
                    // a guest without NICs is still worth printing
                    Err(ZvmError::InstanceNotFound(_)) if stat.is_some() => {
                        debug!("{} has no {:?} data", name, kind);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            (stat.into_iter().collect(), 0)
        }
    };

    Ok(InspectReport {
        instances,
        skipped,
        refreshes: inspector.counters(),
    })
}

fn kinds(inspector: &Inspector) -> Vec<MetricKind> {
    let settings = inspector.settings();
    let mut kinds = Vec::with_capacity(2);
    if settings.collect_cpumem {
        kinds.push(MetricKind::CpuMem);
    }
    if settings.collect_nics {
        kinds.push(MetricKind::Nics);
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use zvm_perf_exporter::xcat::testdata::{TestData, TestDataTransport, TestInstance};
    use zvm_perf_exporter::xcat::{XcatClient, XcatUrl};
    use zvm_perf_exporter::NicRecord;

    fn guest(node: &str, running: bool, nics: Vec<NicRecord>) -> TestInstance {
        TestInstance {
            node: node.to_string(),
            userid: node.to_uppercase(),
            running,
            guest_cpus: 2,
            used_cpu_time_us: 5_000,
            used_memory_kb: 4096,
            nics,
        }
    }

    fn inspector() -> Inspector {
        let nic = NicRecord {
            vswitch_name: "XCATVSW1".into(),
            nic_vdev: "0600".into(),
            nic_rx: 100,
            nic_tx: 200,
            ..Default::default()
        };
        let data = TestData {
            version: "1.0".into(),
            generated_at: "2024-01-01T00:00:00Z".into(),
            zhcp_nodename: "zhcp".into(),
            zhcp_hostname: "zhcp.example.com".into(),
            zhcp_userid: "ZHCP".into(),
            instances: vec![
                guest("vm1", true, vec![nic]),
                guest("vm2", true, vec![]),
                guest("vm3", false, vec![]),
            ],
        };
        let client = XcatClient::new(
            Box::new(TestDataTransport::new(data)),
            XcatUrl::new("admin", "secret"),
        );
        Inspector::new(client, Config::default().inspector_settings())
    }

    #[test]
    fn test_collect_all_stopped_guest_has_no_cpumem() {
        let report = collect(&mut inspector(), None).unwrap();
        let names: Vec<&str> = report.instances.iter().map(|s| s.nodename.as_str()).collect();
        assert_eq!(names, vec!["vm1", "vm2", "vm3"]);
        assert_eq!(report.skipped, 0);

        let vm3 = &report.instances[2];
        assert!(vm3.cpumem.is_none());
        assert_eq!(vm3.nics.as_deref(), Some(&[][..]));

        assert_eq!(report.refreshes.full, 1);
        // vm3 is looked up once more before it is given up on
        assert_eq!(report.refreshes.targeted, 1);
        assert_eq!(report.refreshes.nics, 1);
    }

    #[test]
    fn test_collect_single_instance() {
        let report = collect(&mut inspector(), Some("vm1")).unwrap();
        assert_eq!(report.instances.len(), 1);
        let stat = &report.instances[0];
        assert_eq!(stat.cpumem.as_ref().unwrap().used_memory, 4);
        assert_eq!(stat.nics.as_ref().unwrap()[0].nic_tx, 200);
    }

    #[test]
    fn test_collect_unknown_instance_fails() {
        let err = collect(&mut inspector(), Some("nope")).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
