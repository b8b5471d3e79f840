//! Cache orchestration for per-guest performance stats.
//!
//! The [`Inspector`] owns the stat cache and one cache-wide expiration
//! instant. A lookup first runs a full refresh if the cache has expired
//! (enumerate guests, clear, reload CPU/memory for all of them); a guest
//! still missing afterwards gets one targeted refresh before the lookup
//! fails with [`ZvmError::InstanceNotFound`]. NIC counters come from a
//! separate vswitch query that covers every known guest at once.

use ahash::AHashMap as HashMap;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::InstanceStatCache;
use crate::config::{DEFAULT_CACHE_UPDATE_INTERVAL, DEFAULT_XCAT_MASTER, DEFAULT_ZHCP_NODENAME};
use crate::error::{Result, ZvmError};
use crate::parser::vswitch::nics_by_userid;
use crate::stats::{
    CpuMemRecord, CpuStats, InstanceStat, Interface, InterfaceStats, MemoryUsageStats,
};
use crate::xcat::{XcatClient, ZhcpInfo};

/// Power state reported for a guest that is shut off.
pub const POWER_STATE_SHUTOFF: u8 = 0x04;

/// Which part of an [`InstanceStat`] a lookup needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    CpuMem,
    Nics,
}

/// A guest as the caller knows it: its xCAT node name and, if known, its
/// power state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub power_state: Option<u8>,
}

impl Instance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            power_state: None,
        }
    }

    pub fn with_power_state(name: impl Into<String>, power_state: u8) -> Self {
        Self {
            name: name.into(),
            power_state: Some(power_state),
        }
    }

    pub fn is_shut_off(&self) -> bool {
        self.power_state == Some(POWER_STATE_SHUTOFF)
    }
}

#[derive(Debug, Clone)]
pub struct InspectorSettings {
    pub zhcp_nodename: String,
    /// Node name of the z/VM host; excluded from enumeration.
    pub zvm_host: String,
    pub xcat_master: String,
    pub cache_update_interval: Duration,
    /// Whether [`Inspector::poll_all`] collects CPU/memory.
    pub collect_cpumem: bool,
    /// Whether [`Inspector::poll_all`] collects NIC counters.
    pub collect_nics: bool,
}

impl Default for InspectorSettings {
    fn default() -> Self {
        Self {
            zhcp_nodename: DEFAULT_ZHCP_NODENAME.to_string(),
            zvm_host: String::new(),
            xcat_master: DEFAULT_XCAT_MASTER.to_string(),
            cache_update_interval: Duration::from_secs(DEFAULT_CACHE_UPDATE_INTERVAL),
            collect_cpumem: true,
            collect_nics: true,
        }
    }
}

/// How often each refresh path ran since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshCounters {
    pub full: u64,
    pub targeted: u64,
    pub nics: u64,
}

/// Outcome of one [`Inspector::poll_all`] cycle.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    /// Sorted by node name.
    pub stats: Vec<InstanceStat>,
    /// Guests left out because they were shut off or not found.
    pub skipped: usize,
}

pub struct Inspector {
    client: XcatClient,
    settings: InspectorSettings,
    cache: InstanceStatCache,
    expiration: Instant,
    zhcp: Option<ZhcpInfo>,
    /// Node name to userid, from the last full refresh.
    instances: HashMap<String, String>,
    counters: RefreshCounters,
}

impl Inspector {
    /// No xCAT call is made until the first lookup.
    pub fn new(client: XcatClient, settings: InspectorSettings) -> Self {
        Self {
            client,
            settings,
            cache: InstanceStatCache::new(),
            expiration: Instant::now(),
            zhcp: None,
            instances: HashMap::new(),
            counters: RefreshCounters::default(),
        }
    }

    pub fn settings(&self) -> &InspectorSettings {
        &self.settings
    }

    pub fn cache(&self) -> &InstanceStatCache {
        &self.cache
    }

    pub fn counters(&self) -> RefreshCounters {
        self.counters
    }

    pub fn expiration(&self) -> Instant {
        self.expiration
    }

    /// Guests from the last full refresh, node name to userid.
    pub fn instances(&self) -> &HashMap<String, String> {
        &self.instances
    }

    /// zhcp identity, looked up on first use and kept afterwards.
    pub fn zhcp(&mut self) -> Result<ZhcpInfo> {
        if let Some(zhcp) = &self.zhcp {
            return Ok(zhcp.clone());
        }
        let zhcp = self.client.resolve_zhcp(&self.settings.zhcp_nodename)?;
        info!(
            "Resolved zhcp node {} (hostname {}, userid {})",
            zhcp.nodename, zhcp.hostname, zhcp.userid
        );
        self.zhcp = Some(zhcp.clone());
        Ok(zhcp)
    }

    /// Runs a full refresh when the cache has expired.
    pub fn check_expiration(&mut self) -> Result<()> {
        if Instant::now() >= self.expiration {
            self.refresh_all()?;
        }
        Ok(())
    }

    /// Clears the cache, re-enumerates the guests and reloads CPU/memory for
    /// all of them. The expiration moves forward only once the enumeration
    /// succeeded; until then every lookup retries the full refresh.
    pub fn refresh_all(&mut self) -> Result<()> {
        let start = Instant::now();
        self.cache.clear();
        self.counters.full += 1;

        let (zhcp, instances) = match self.enumerate() {
            Ok(enumerated) => enumerated,
            Err(e) => {
                self.instances.clear();
                self.expiration = start;
                warn!("Guest enumeration failed, next lookup retries: {}", e);
                return Err(e);
            }
        };
        self.instances = instances;
        self.expiration = start + self.settings.cache_update_interval;

        let targets: Vec<(String, String)> = self
            .instances
            .iter()
            .map(|(node, userid)| (node.clone(), userid.clone()))
            .collect();
        self.update_cpumem(&zhcp, &targets)?;

        info!(
            "Full cache refresh: {} instances, {} with CPU/memory data, {:.2}ms",
            self.instances.len(),
            self.cache.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn enumerate(&mut self) -> Result<(ZhcpInfo, HashMap<String, String>)> {
        let zhcp = self.zhcp()?;
        let instances = self.client.list_instances(
            &zhcp,
            &self.settings.zvm_host,
            &self.settings.xcat_master,
        )?;
        Ok((zhcp, instances))
    }

    /// Converts the whole report before touching the cache, so a malformed
    /// block leaves the cache as it was.
    fn update_cpumem(&mut self, zhcp: &ZhcpInfo, targets: &[(String, String)]) -> Result<()> {
        let userids: Vec<String> = targets.iter().map(|(_, u)| u.clone()).collect();
        let report = self
            .client
            .image_performance_query(&zhcp.nodename, &userids)?;

        let mut records = Vec::with_capacity(targets.len());
        for (node, userid) in targets {
            match report.get(&userid.to_uppercase()) {
                Some(fields) => {
                    records.push(InstanceStat::with_cpumem(
                        node,
                        userid,
                        CpuMemRecord::from_perf(fields)?,
                    ));
                }
                None => debug!("No performance data returned for {} ({})", node, userid),
            }
        }

        for record in records {
            self.cache.set(record);
        }
        Ok(())
    }

    /// One vswitch query for every enumerated guest plus `requested`.
    /// Enumerated guests without a NIC get an empty list; `requested` is only
    /// stored if it owns a NIC.
    fn update_nics(&mut self, zhcp: &ZhcpInfo, requested: (&str, &str)) -> Result<()> {
        let mut by_userid = nics_by_userid(self.client.vswitch_query_iuo_stats(&zhcp.nodename)?);
        self.counters.nics += 1;

        let (req_node, req_userid) = requested;
        if !self.instances.contains_key(req_node) {
            if let Some(nics) = by_userid.remove(&req_userid.to_uppercase()) {
                self.cache
                    .set(InstanceStat::with_nics(req_node, req_userid, nics));
            }
        }

        for (node, userid) in &self.instances {
            let nics = by_userid
                .get(&userid.to_uppercase())
                .cloned()
                .unwrap_or_default();
            self.cache.set(InstanceStat::with_nics(node, userid, nics));
        }

        debug!("NIC refresh stored data for {} instances", self.cache.len());
        Ok(())
    }

    fn has_part(&self, kind: MetricKind, name: &str) -> bool {
        self.cache.get(name).map_or(false, |stat| match kind {
            MetricKind::CpuMem => stat.cpumem.is_some(),
            MetricKind::Nics => stat.nics.is_some(),
        })
    }

    fn targeted_refresh(&mut self, kind: MetricKind, name: &str) -> Result<()> {
        let userid = match self.instances.get(name) {
            Some(userid) => userid.clone(),
            None => self.client.get_userid(name)?,
        };
        let zhcp = self.zhcp()?;
        debug!("Targeted {:?} refresh for {} ({})", kind, name, userid);

        match kind {
            MetricKind::CpuMem => {
                self.counters.targeted += 1;
                self.update_cpumem(&zhcp, &[(name.to_string(), userid)])
            }
            MetricKind::Nics => self.update_nics(&zhcp, (name, &userid)),
        }
    }

    /// Merged stat of `instance` with the `kind` part present.
    pub fn get_stat(&mut self, kind: MetricKind, instance: &Instance) -> Result<InstanceStat> {
        if instance.is_shut_off() {
            return Err(ZvmError::InstanceShutOff(instance.name.clone()));
        }

        self.check_expiration()?;

        if !self.has_part(kind, &instance.name) {
            self.targeted_refresh(kind, &instance.name)?;
        }

        if !self.has_part(kind, &instance.name) {
            return Err(ZvmError::InstanceNotFound(instance.name.clone()));
        }

        self.cache
            .get(&instance.name)
            .cloned()
            .ok_or_else(|| ZvmError::InstanceNotFound(instance.name.clone()))
    }

    pub fn inspect_cpus(&mut self, instance: &Instance) -> Result<CpuStats> {
        let cpumem = self.cpumem(instance)?;
        Ok(CpuStats {
            number: cpumem.guest_cpus,
            time: cpumem.used_cpu_time,
        })
    }

    pub fn inspect_memory_usage(&mut self, instance: &Instance) -> Result<MemoryUsageStats> {
        let cpumem = self.cpumem(instance)?;
        Ok(MemoryUsageStats {
            usage: cpumem.used_memory,
        })
    }

    /// One entry per NIC, vswitch-major.
    pub fn inspect_vnics(&mut self, instance: &Instance) -> Result<Vec<(Interface, InterfaceStats)>> {
        let stat = self.get_stat(MetricKind::Nics, instance)?;
        Ok(stat
            .nics
            .unwrap_or_default()
            .iter()
            .map(|nic| (Interface::for_nic(&stat.userid, nic), InterfaceStats::from(nic)))
            .collect())
    }

    fn cpumem(&mut self, instance: &Instance) -> Result<CpuMemRecord> {
        self.get_stat(MetricKind::CpuMem, instance)?
            .cpumem
            .ok_or_else(|| ZvmError::InstanceNotFound(instance.name.clone()))
    }

    /// One exporter cycle over every enumerated guest. Guests that are gone
    /// or shut off are skipped; any other failure aborts the cycle.
    pub fn poll_all(&mut self) -> Result<PollReport> {
        self.check_expiration()?;

        let mut names: Vec<String> = self.instances.keys().cloned().collect();
        names.sort();

        let mut kinds = Vec::with_capacity(2);
        if self.settings.collect_cpumem {
            kinds.push(MetricKind::CpuMem);
        }
        if self.settings.collect_nics {
            kinds.push(MetricKind::Nics);
        }

        let mut report = PollReport::default();
        for name in names {
            let instance = Instance::new(name);
            let mut collected = None;
            for kind in &kinds {
                match self.get_stat(*kind, &instance) {
                    Ok(stat) => collected = Some(stat),
                    Err(e @ (ZvmError::InstanceNotFound(_) | ZvmError::InstanceShutOff(_))) => {
                        warn!("Skipping {:?} stats: {}", kind, e);
                    }
                    Err(e) => return Err(e),
                }
            }
            match collected {
                // the last lookup holds every part gathered this cycle
                Some(stat) => report.stats.push(stat),
                None => report.skipped += 1,
            }
        }

        debug!(
            "Poll collected {} instances, skipped {}",
            report.stats.len(),
            report.skipped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::vswitch::tests::SAMPLE;
    use crate::xcat::transport::fake::FakeTransport;
    use crate::xcat::XcatUrl;
    use crate::xcat::XcatTransport;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TABLE: &[&str] = &[
        "#node,hcp,userid,nodetype,parent,comments,disable",
        "\"xcat\",\"zhcp.com\",\"xcat\"",
        "\"zhcp\",\"zhcp.com\",\"zhcp\"",
        "\"zvmhost1\",\"zhcp.com\",\"\"",
        "\"inst1\",\"zhcp.com\",\"inst1\"",
        "\"inst2\",\"zhcp.com\",\"inst2\"",
    ];

    fn perf_report(inst1_cpus: &str) -> String {
        let block = |userid: &str, cpus: &str| {
            format!(
                "zhcp: Guest name: {}\n\
                 zhcp: Used CPU time: \"1710205201 uS\"\n\
                 zhcp: Elapsed time: \"6659572798 uS\"\n\
                 zhcp: Used memory: \"4189268 KB\"\n\
                 zhcp: Guest CPUs: \"{}\"\n\
                 zhcp: \n",
                userid, cpus
            )
        };
        format!(
            "zhcp: Number of virtual server IDs: 3 \n{}{}{}",
            block("INST1", inst1_cpus),
            block("INST2", "4"),
            block("INST9", "1")
        )
    }

    /// xCAT that knows inst1/inst2 in its zvm table and reports performance
    /// data for INST1, INST2 and an unlisted INST9.
    fn xcat(inst1_cpus: &'static str) -> Arc<FakeTransport> {
        Arc::new(FakeTransport::new(move |_, url, body| {
            let command = body.map(|b| b.join(" ")).unwrap_or_default();
            let reply = if url.contains("/tables/hosts") {
                json!({"data": [{"data": ["zhcp.com"]}]})
            } else if url.contains("/tables/zvm") {
                json!({"data": [{"data": TABLE}]})
            } else if command.contains("Image_Performance_Query") {
                json!({"data": [{"data": [perf_report(inst1_cpus)]}]})
            } else if command.contains("Vswitch_Query_IUO_Stats") {
                json!({"data": [{"data": SAMPLE.split('\n').collect::<Vec<_>>()}]})
            } else if let Some(node) = url.strip_prefix("/xcatws/nodes/") {
                let node = node.split('?').next().unwrap_or_default();
                json!({"data": [{"info": [format!("userid={}", node.to_uppercase())]}]})
            } else {
                return Err(ZvmError::no_data(format!("unexpected call {}", url)));
            };
            Ok(reply.to_string())
        }))
    }

    fn inspector(fake: &Arc<FakeTransport>, interval: Duration) -> Inspector {
        let client = XcatClient::new(Box::new(fake.clone()), XcatUrl::new("user", "pwd"));
        Inspector::new(
            client,
            InspectorSettings {
                zvm_host: "zvmhost1".into(),
                cache_update_interval: interval,
                ..InspectorSettings::default()
            },
        )
    }

    fn commands(fake: &FakeTransport, pattern: &str) -> usize {
        fake.bodies()
            .iter()
            .filter(|b| b.iter().any(|c| c.contains(pattern)))
            .count()
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_new_makes_no_calls() {
        let fake = xcat("2");
        let _inspector = inspector(&fake, HOUR);
        assert_eq!(fake.count(""), 0);
    }

    #[test]
    fn test_single_full_refresh_within_interval() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, HOUR);

        let cpus = inspector.inspect_cpus(&Instance::new("inst1")).unwrap();
        assert_eq!(cpus.number, 2);
        assert_eq!(cpus.time, 1_710_205_201_000);
        let mem = inspector.inspect_memory_usage(&Instance::new("inst2")).unwrap();
        assert_eq!(mem.usage, 4091);

        assert_eq!(fake.count("/tables/zvm"), 1);
        assert_eq!(commands(&fake, "Image_Performance_Query"), 1);
        assert_eq!(inspector.counters().full, 1);
        assert_eq!(inspector.counters().targeted, 0);
        // zhcp identity resolved once
        assert_eq!(fake.count("/tables/hosts"), 1);
    }

    #[test]
    fn test_expired_cache_refreshes_again() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, Duration::ZERO);
        inspector.inspect_cpus(&Instance::new("inst1")).unwrap();
        inspector.inspect_cpus(&Instance::new("inst1")).unwrap();
        assert_eq!(inspector.counters().full, 2);
        assert_eq!(fake.count("/tables/zvm"), 2);
        assert_eq!(fake.count("/tables/hosts"), 1);
    }

    #[test]
    fn test_targeted_refresh_for_unlisted_instance() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, HOUR);

        let cpus = inspector.inspect_cpus(&Instance::new("inst9")).unwrap();
        assert_eq!(cpus.number, 1);
        assert_eq!(inspector.counters().targeted, 1);
        assert_eq!(fake.count("/xcatws/nodes/inst9?"), 1);
        assert_eq!(inspector.cache().get("inst9").unwrap().userid, "INST9");

        // now cached: no further refresh
        inspector.inspect_cpus(&Instance::new("inst9")).unwrap();
        assert_eq!(inspector.counters().targeted, 1);
        assert_eq!(commands(&fake, "Image_Performance_Query"), 2);
        assert_eq!(
            fake.bodies()[1][0],
            "command=smcli Image_Performance_Query -T \"INST9\" -c 1"
        );
    }

    #[test]
    fn test_missing_instance_retries_once() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, HOUR);

        let err = inspector.inspect_cpus(&Instance::new("ghost")).unwrap_err();
        assert!(matches!(err, ZvmError::InstanceNotFound(ref n) if n == "ghost"));
        assert_eq!(commands(&fake, "Image_Performance_Query"), 2);
        assert_eq!(inspector.counters().targeted, 1);
    }

    #[test]
    fn test_shut_off_instance_makes_no_calls() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, HOUR);

        let instance = Instance::with_power_state("inst1", POWER_STATE_SHUTOFF);
        let err = inspector.inspect_cpus(&instance).unwrap_err();
        assert!(matches!(err, ZvmError::InstanceShutOff(_)));
        assert_eq!(fake.count(""), 0);

        // other power states are served normally
        let running = Instance::with_power_state("inst1", 0x01);
        assert!(inspector.inspect_cpus(&running).is_ok());
    }

    #[test]
    fn test_malformed_guest_cpus_fails_without_partial_cache() {
        let fake = xcat("s");
        let mut inspector = inspector(&fake, HOUR);

        let err = inspector.inspect_cpus(&Instance::new("inst2")).unwrap_err();
        assert!(matches!(err, ZvmError::MalformedResponse(_)));
        assert!(inspector.cache().get("inst2").is_none());
    }

    #[test]
    fn test_vnics_merge_with_cpumem() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, HOUR);
        let inst1 = Instance::new("inst1");

        inspector.inspect_cpus(&inst1).unwrap();
        let vnics = inspector.inspect_vnics(&inst1).unwrap();

        let names: Vec<&str> = vnics.iter().map(|(i, _)| i.name.as_str()).collect();
        assert_eq!(names, vec!["XCATVSW1_INST1_0600", "XCATVSW2_INST1_1000"]);
        assert_eq!(vnics[0].1.rx_bytes, 103024058);
        assert_eq!(vnics[0].1.tx_errors, 4);

        let stat = inspector.cache().get("inst1").unwrap();
        assert!(stat.cpumem.is_some());
        assert_eq!(stat.nics.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_one_vswitch_query_serves_all_instances() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, HOUR);

        inspector.inspect_vnics(&Instance::new("inst1")).unwrap();
        let inst2 = inspector.inspect_vnics(&Instance::new("inst2")).unwrap();
        assert_eq!(inst2.len(), 2);
        assert_eq!(inst2[1].0.name, "XCATVSW2_INST2_1000");
        assert_eq!(commands(&fake, "Vswitch_Query_IUO_Stats"), 1);
        assert_eq!(inspector.counters().nics, 1);
    }

    #[test]
    fn test_vnics_for_instance_without_nics() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, HOUR);

        // inst9 is not enumerated and owns no NIC
        let err = inspector.inspect_vnics(&Instance::new("inst9")).unwrap_err();
        assert!(matches!(err, ZvmError::InstanceNotFound(_)));
    }

    #[test]
    fn test_poll_all() {
        let fake = xcat("2");
        let mut inspector = inspector(&fake, HOUR);

        let report = inspector.poll_all().unwrap();
        assert_eq!(report.skipped, 0);
        let nodes: Vec<&str> = report.stats.iter().map(|s| s.nodename.as_str()).collect();
        assert_eq!(nodes, vec!["inst1", "inst2"]);
        for stat in &report.stats {
            assert!(stat.cpumem.is_some());
            assert_eq!(stat.nics.as_ref().map(Vec::len), Some(2));
        }
        assert_eq!(inspector.counters().full, 1);
        assert_eq!(inspector.counters().nics, 1);
    }

    #[test]
    fn test_failed_enumeration_is_retried_on_next_poll() {
        let healthy = xcat("2");
        let zvm_calls = AtomicUsize::new(0);
        let fake = Arc::new(FakeTransport::new(move |method, url, body| {
            if url.contains("/tables/zvm") && zvm_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ZvmError::no_data("transient timeout"));
            }
            healthy.request(method.clone(), url, body)
        }));
        let mut inspector = inspector(&fake, HOUR);

        assert!(matches!(inspector.poll_all(), Err(ZvmError::NoData(_))));
        assert!(inspector.instances().is_empty());
        assert!(inspector.expiration() <= Instant::now());

        let report = inspector.poll_all().unwrap();
        assert_eq!(report.stats.len(), 2);
        assert_eq!(inspector.counters().full, 2);
        assert_eq!(fake.count("/tables/zvm"), 2);

        // enumerated now: later polls stay within the interval
        inspector.poll_all().unwrap();
        assert_eq!(inspector.counters().full, 2);
    }

    #[test]
    fn test_poll_all_propagates_malformed() {
        let fake = xcat("s");
        let mut inspector = inspector(&fake, HOUR);
        assert!(matches!(
            inspector.poll_all(),
            Err(ZvmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_poll_all_respects_disabled_nics() {
        let fake = xcat("2");
        let client = XcatClient::new(Box::new(fake.clone()), XcatUrl::new("user", "pwd"));
        let mut inspector = Inspector::new(
            client,
            InspectorSettings {
                zvm_host: "zvmhost1".into(),
                collect_nics: false,
                ..InspectorSettings::default()
            },
        );
        let report = inspector.poll_all().unwrap();
        assert_eq!(report.stats.len(), 2);
        assert!(report.stats[0].nics.is_none());
        assert_eq!(commands(&fake, "Vswitch_Query_IUO_Stats"), 0);
    }
}
