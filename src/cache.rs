//! Per-instance stat cache.
//!
//! Entries are keyed by node name. CPU/memory and NIC data come from separate
//! refreshes and are merged into one [`InstanceStat`] per node. Expiration is
//! tracked by the inspector, not here.

use ahash::AHashMap as HashMap;
use tracing::trace;

use crate::stats::InstanceStat;

#[derive(Debug, Clone, Default)]
pub struct InstanceStatCache {
    entries: HashMap<String, InstanceStat>,
}

impl InstanceStatCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts `record` under its node name, merging with an existing entry.
    pub fn set(&mut self, record: InstanceStat) {
        match self.entries.get_mut(&record.nodename) {
            Some(existing) => {
                trace!("Merging cached stat for {}", record.nodename);
                existing.merge(record);
            }
            None => {
                trace!("Caching new stat for {}", record.nodename);
                self.entries.insert(record.nodename.clone(), record);
            }
        }
    }

    pub fn get(&self, nodename: &str) -> Option<&InstanceStat> {
        self.entries.get(nodename)
    }

    /// Removes the entry; absent keys are ignored.
    pub fn delete(&mut self, nodename: &str) {
        self.entries.remove(nodename);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &InstanceStat> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{CpuMemRecord, NicRecord};

    fn cpumem(cpus: u64) -> CpuMemRecord {
        CpuMemRecord {
            guest_cpus: cpus,
            used_cpu_time: 1000,
            used_memory: 512,
        }
    }

    fn nic(vdev: &str) -> NicRecord {
        NicRecord {
            vswitch_name: "VSW1".into(),
            nic_vdev: vdev.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut cache = InstanceStatCache::new();
        cache.set(InstanceStat::with_cpumem("node", "NODE", cpumem(2)));
        let stat = cache.get("node").unwrap();
        assert_eq!(stat.userid, "NODE");
        assert_eq!(stat.cpumem.as_ref().unwrap().guest_cpus, 2);
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_partial_sets_merge() {
        let mut cache = InstanceStatCache::new();
        cache.set(InstanceStat::with_cpumem("node", "NODE", cpumem(2)));
        cache.set(InstanceStat::with_nics("node", "NODE", vec![nic("0600")]));

        assert_eq!(cache.len(), 1);
        let stat = cache.get("node").unwrap();
        assert_eq!(stat.cpumem.as_ref().unwrap().guest_cpus, 2);
        assert_eq!(stat.nics.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_cpumem_refresh_replaces_only_cpumem() {
        let mut cache = InstanceStatCache::new();
        cache.set(InstanceStat::with_nics("node", "NODE", vec![nic("0600")]));
        cache.set(InstanceStat::with_cpumem("node", "NODE", cpumem(2)));
        cache.set(InstanceStat::with_cpumem("node", "NODE", cpumem(4)));

        let stat = cache.get("node").unwrap();
        assert_eq!(stat.cpumem.as_ref().unwrap().guest_cpus, 4);
        assert_eq!(stat.nics.as_ref().unwrap()[0].nic_vdev, "0600");
    }

    #[test]
    fn test_delete() {
        let mut cache = InstanceStatCache::new();
        cache.set(InstanceStat::with_cpumem("node", "NODE", cpumem(1)));
        cache.delete("node");
        assert!(cache.get("node").is_none());
        // absent key is a no-op
        cache.delete("node");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut cache = InstanceStatCache::new();
        cache.set(InstanceStat::with_cpumem("node1", "NODE1", cpumem(1)));
        cache.set(InstanceStat::with_nics("node2", "NODE2", vec![]));
        cache.clear();
        assert!(cache.get("node1").is_none());
        assert!(cache.get("node2").is_none());
        assert_eq!(cache.len(), 0);
    }
}
