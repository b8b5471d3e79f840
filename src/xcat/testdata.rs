//! Offline stand-in for the xCAT service.
//!
//! A [`TestData`] file describes a zhcp node and its guests. The
//! [`TestDataTransport`] answers REST calls from it with the same JSON
//! envelopes and command text the real service produces, so offline runs
//! exercise every decoder.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::transport::XcatTransport;
use crate::error::{Result, ZvmError};
use crate::stats::NicRecord;

fn default_running() -> bool {
    true
}

/// One guest with raw values as zhcp reports them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestInstance {
    pub node: String,
    pub userid: String,
    /// Stopped guests are listed in the zvm table but missing from every
    /// performance report.
    #[serde(default = "default_running")]
    pub running: bool,
    pub guest_cpus: u64,
    pub used_cpu_time_us: u64,
    pub used_memory_kb: u64,
    #[serde(default)]
    pub nics: Vec<NicRecord>,
}

/// Root structure for test data JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestData {
    pub version: String,
    pub generated_at: String,
    pub zhcp_nodename: String,
    pub zhcp_hostname: String,
    pub zhcp_userid: String,
    pub instances: Vec<TestInstance>,
}

/// Load test data from JSON file.
pub fn load_test_data_from_file(path: &Path) -> Result<TestData> {
    debug!("Loading test data from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        ZvmError::Config(format!(
            "Failed to read test data file {}: {}",
            path.display(),
            e
        ))
    })?;
    let test_data: TestData = serde_json::from_str(&content)
        .map_err(|e| ZvmError::Config(format!("Failed to parse test data JSON: {}", e)))?;

    info!(
        "Loaded test data version {} from {} ({} instances)",
        test_data.version,
        test_data.generated_at,
        test_data.instances.len()
    );

    Ok(test_data)
}

pub struct TestDataTransport {
    data: TestData,
}

impl TestDataTransport {
    pub fn new(data: TestData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &TestData {
        &self.data
    }

    fn tabdump_zvm(&self) -> Value {
        let zhcp = &self.data.zhcp_hostname;
        let mut rows = vec!["#node,hcp,userid,nodetype,parent,comments,disable".to_string()];
        rows.push(format!(
            "\"{}\",\"{}\",\"{}\",,,,",
            self.data.zhcp_nodename, zhcp, self.data.zhcp_userid
        ));
        for inst in &self.data.instances {
            rows.push(format!("\"{}\",\"{}\",\"{}\",,,,", inst.node, zhcp, inst.userid));
        }
        json!({"data": [{"data": rows}]})
    }

    fn hostname(&self, node: &str) -> Result<Value> {
        if node.eq_ignore_ascii_case(&self.data.zhcp_nodename) {
            Ok(json!({"data": [{"data": [self.data.zhcp_hostname]}]}))
        } else {
            Err(ZvmError::no_data(format!("no hosts entry for {}", node)))
        }
    }

    fn lsdef(&self, node: &str) -> Result<Value> {
        let userid = if node.eq_ignore_ascii_case(&self.data.zhcp_nodename) {
            &self.data.zhcp_userid
        } else {
            &self
                .data
                .instances
                .iter()
                .find(|i| i.node.eq_ignore_ascii_case(node))
                .ok_or_else(|| {
                    ZvmError::no_data(format!("Could not find an object named '{}'", node))
                })?
                .userid
        };
        let info = vec![
            format!("Object name: {}", node),
            "    arch=s390x".to_string(),
            format!("    hcp={}", self.data.zhcp_hostname),
            "    mgt=zvm".to_string(),
            format!("    userid={}", userid),
        ];
        Ok(json!({"data": [{"info": info}]}))
    }

    fn performance_report(&self, node: &str, command: &str) -> Value {
        let requested: Vec<String> = quoted_target(command)
            .split_whitespace()
            .map(str::to_uppercase)
            .collect();
        let guests: Vec<&TestInstance> = self
            .data
            .instances
            .iter()
            .filter(|i| i.running && requested.contains(&i.userid.to_uppercase()))
            .collect();

        let mut raw = format!("{}: Number of virtual server IDs: {} \n", node, guests.len());
        for guest in guests {
            raw.push_str(&format!("{}: Guest name: {}\n", node, guest.userid));
            raw.push_str(&format!(
                "{}: Used CPU time: \"{} uS\"\n",
                node, guest.used_cpu_time_us
            ));
            raw.push_str(&format!(
                "{}: Elapsed time: \"{} uS\"\n",
                node,
                guest.used_cpu_time_us.saturating_mul(3)
            ));
            raw.push_str(&format!(
                "{}: Used memory: \"{} KB\"\n",
                node, guest.used_memory_kb
            ));
            raw.push_str(&format!("{}: Guest CPUs: \"{}\"\n", node, guest.guest_cpus));
            raw.push_str(&format!("{}: \n", node));
        }
        json!({"data": [{"data": [raw]}]})
    }

    fn vswitch_report(&self, node: &str) -> Value {
        let mut switches: Vec<(&str, Vec<(&str, &NicRecord)>)> = Vec::new();
        for inst in self.data.instances.iter().filter(|i| i.running) {
            for nic in &inst.nics {
                match switches.iter_mut().find(|(name, _)| *name == nic.vswitch_name) {
                    Some((_, nics)) => nics.push((inst.userid.as_str(), nic)),
                    None => switches.push((
                        nic.vswitch_name.as_str(),
                        vec![(inst.userid.as_str(), nic)],
                    )),
                }
            }
        }

        let mut lines = vec![
            format!("{}: vswitch count: {}", node, switches.len()),
            format!("{}: ", node),
        ];
        for (i, (name, nics)) in switches.iter().enumerate() {
            lines.push(format!("{}: vswitch number: {}", node, i + 1));
            lines.push(format!("{}: vswitch name: {}", node, name));
            lines.push(format!("{}: uplink count: 1", node));
            lines.push(format!("{}: uplink_conn: 6240", node));
            for prefix in ["uplink", "bridge"] {
                for counter in [
                    "fr_rx", "fr_rx_dsc", "fr_rx_err", "fr_tx", "fr_tx_dsc", "fr_tx_err", "rx",
                    "tx",
                ] {
                    lines.push(format!("{}: {}_{}: 0", node, prefix, counter));
                }
            }
            lines.push(format!("{}: nic count: {}", node, nics.len()));
            for (userid, nic) in nics {
                lines.push(format!("{}: nic_id: {} {}", node, userid, nic.nic_vdev));
                lines.push(format!("{}: nic_fr_rx: {}", node, nic.nic_fr_rx));
                lines.push(format!("{}: nic_fr_rx_dsc: {}", node, nic.nic_fr_rx_dsc));
                lines.push(format!("{}: nic_fr_rx_err: {}", node, nic.nic_fr_rx_err));
                lines.push(format!("{}: nic_fr_tx: {}", node, nic.nic_fr_tx));
                lines.push(format!("{}: nic_fr_tx_dsc: {}", node, nic.nic_fr_tx_dsc));
                lines.push(format!("{}: nic_fr_tx_err: {}", node, nic.nic_fr_tx_err));
                lines.push(format!("{}: nic_rx: {}", node, nic.nic_rx));
                lines.push(format!("{}: nic_tx: {}", node, nic.nic_tx));
            }
            lines.push(format!("{}: vlan count: 0", node));
            lines.push(format!("{}: ", node));
        }
        json!({"data": [{"data": lines}]})
    }

    fn xdsh(&self, node: &str, body: Option<&[String]>) -> Result<Value> {
        let command = body
            .and_then(|b| b.first())
            .and_then(|c| c.strip_prefix("command="))
            .ok_or_else(|| ZvmError::no_data("xdsh request without a command"))?;

        if command.starts_with("smcli Image_Performance_Query") {
            Ok(self.performance_report(node, command))
        } else if command.starts_with("smcli Virtual_Network_Vswitch_Query_IUO_Stats") {
            Ok(self.vswitch_report(node))
        } else {
            Err(ZvmError::no_data(format!("unsupported command: {}", command)))
        }
    }
}

impl XcatTransport for TestDataTransport {
    fn request(&self, method: Method, url: &str, body: Option<&[String]>) -> Result<String> {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        let put = method == Method::PUT;
        let reply = match segments.as_slice() {
            ["xcatws", "nodes", node, "dsh"] if put => self.xdsh(node, body)?,
            ["xcatws", "nodes", node] if !put => self.lsdef(node)?,
            ["xcatws", "tables", "zvm"] if !put => self.tabdump_zvm(),
            ["xcatws", "tables", "hosts"] if !put => {
                let node = query_value(query, "value")
                    .ok_or_else(|| ZvmError::no_data("hosts lookup without a node value"))?;
                self.hostname(node)?
            }
            _ => {
                return Err(ZvmError::no_data(format!(
                    "test data has no answer for {} {}",
                    method, path
                )))
            }
        };
        Ok(reply.to_string())
    }
}

/// Text between the first pair of double quotes after `-T`.
fn quoted_target(command: &str) -> &str {
    command
        .split_once("-T \"")
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(ids, _)| ids)
        .unwrap_or("")
}

fn query_value<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::xcat::{XcatClient, XcatUrl};

    pub(crate) fn sample() -> TestData {
        let nic = |vswitch: &str, vdev: &str, rx: u64| NicRecord {
            vswitch_name: vswitch.into(),
            nic_vdev: vdev.into(),
            nic_fr_rx: rx / 100,
            nic_fr_tx: rx / 200,
            nic_rx: rx,
            nic_tx: rx / 2,
            ..Default::default()
        };
        TestData {
            version: "1.0".into(),
            generated_at: "2026-01-01T00:00:00Z".into(),
            zhcp_nodename: "zhcp".into(),
            zhcp_hostname: "zhcp.example.com".into(),
            zhcp_userid: "ZHCP".into(),
            instances: vec![
                TestInstance {
                    node: "inst1".into(),
                    userid: "INST1".into(),
                    running: true,
                    guest_cpus: 2,
                    used_cpu_time_us: 1710205201,
                    used_memory_kb: 4189268,
                    nics: vec![nic("VSW1", "0600", 103024058), nic("VSW2", "1000", 4684435)],
                },
                TestInstance {
                    node: "inst2".into(),
                    userid: "INST2".into(),
                    running: true,
                    guest_cpus: 4,
                    used_cpu_time_us: 5000,
                    used_memory_kb: 2048,
                    nics: vec![nic("VSW1", "0600", 3111714)],
                },
                TestInstance {
                    node: "inst3".into(),
                    userid: "INST3".into(),
                    running: false,
                    guest_cpus: 1,
                    used_cpu_time_us: 0,
                    used_memory_kb: 0,
                    nics: vec![],
                },
            ],
        }
    }

    fn client() -> XcatClient {
        XcatClient::new(
            Box::new(TestDataTransport::new(sample())),
            XcatUrl::new("admin", "secret"),
        )
    }

    #[test]
    fn test_zhcp_identity() {
        let zhcp = client().resolve_zhcp("zhcp").unwrap();
        assert_eq!(zhcp.hostname, "zhcp.example.com");
        assert_eq!(zhcp.userid, "ZHCP");
    }

    #[test]
    fn test_instances_exclude_zhcp() {
        let c = client();
        let zhcp = c.resolve_zhcp("zhcp").unwrap();
        let instances = c.list_instances(&zhcp, "zvmhost", "xcat").unwrap();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances["inst2"], "INST2");
    }

    #[test]
    fn test_performance_report_skips_stopped_guests() {
        let ids = vec!["INST1".to_string(), "INST3".to_string()];
        let perf = client().image_performance_query("zhcp", &ids).unwrap();
        assert_eq!(perf.len(), 1);
        assert_eq!(perf["INST1"].used_memory.as_deref(), Some("4189268 KB"));
    }

    #[test]
    fn test_vswitch_report_decodes() {
        let groups = client().vswitch_query_iuo_stats("zhcp").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].vswitch_name, "VSW1");
        assert_eq!(groups[0].nics.len(), 2);
        assert_eq!(groups[1].nics[0].nic.nic_rx, 4684435);
    }

    #[test]
    fn test_unknown_node_is_no_data() {
        let err = client().get_userid("ghost").unwrap_err();
        assert!(matches!(err, ZvmError::NoData(_)));
    }

    #[test]
    fn test_load_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), serde_json::to_string(&sample()).unwrap()).unwrap();
        let data = load_test_data_from_file(file.path()).unwrap();
        assert_eq!(data.instances.len(), 3);
        assert!(!data.instances[2].running);
    }
}
