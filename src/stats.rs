//! Typed per-instance records and the views handed to metric consumers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZvmError};
use crate::parser::perf::PerfFields;

/// Microseconds to nanoseconds.
const NS_PER_US: u64 = 1000;
/// Kilobytes to megabytes.
const KB_PER_MB: u64 = 1024;

/// CPU and memory figures for one guest, already converted to exporter units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuMemRecord {
    pub guest_cpus: u64,
    /// Used CPU time in nanoseconds.
    pub used_cpu_time: u64,
    /// Used memory in MB.
    pub used_memory: u64,
}

impl CpuMemRecord {
    /// Converts the raw strings of one performance block.
    ///
    /// `used_cpu_time` arrives as `"<n> uS"` and `used_memory` as `"<n> KB"`;
    /// only the first whitespace-separated token is numeric.
    pub fn from_perf(fields: &PerfFields) -> Result<Self> {
        let userid = fields.userid.as_deref().unwrap_or("<unknown>");

        let guest_cpus = parse_leading_u64(fields.guest_cpus.as_deref(), "guest_cpus", userid)?;
        let cpu_us = parse_leading_u64(fields.used_cpu_time.as_deref(), "used_cpu_time", userid)?;
        let mem_kb = parse_leading_u64(fields.used_memory.as_deref(), "used_memory", userid)?;

        let used_cpu_time = cpu_us.checked_mul(NS_PER_US).ok_or_else(|| {
            ZvmError::malformed(format!("used_cpu_time overflow for {}: {} uS", userid, cpu_us))
        })?;

        Ok(Self {
            guest_cpus,
            used_cpu_time,
            used_memory: mem_kb / KB_PER_MB,
        })
    }
}

fn parse_leading_u64(raw: Option<&str>, field: &str, userid: &str) -> Result<u64> {
    let raw =
        raw.ok_or_else(|| ZvmError::malformed(format!("{} missing for {}", field, userid)))?;
    let token = raw.split_whitespace().next().unwrap_or("");
    token.parse::<u64>().map_err(|e| {
        ZvmError::malformed(format!(
            "{} for {} is not an integer ({:?}): {}",
            field, userid, raw, e
        ))
    })
}

/// Traffic counters of one virtual NIC attached to a vswitch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicRecord {
    pub vswitch_name: String,
    pub nic_vdev: String,
    pub nic_fr_rx: u64,
    pub nic_fr_rx_dsc: u64,
    pub nic_fr_rx_err: u64,
    pub nic_fr_tx: u64,
    pub nic_fr_tx_dsc: u64,
    pub nic_fr_tx_err: u64,
    pub nic_rx: u64,
    pub nic_tx: u64,
}

/// Merged view of one instance. Either part may be missing if the matching
/// refresh has not populated it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStat {
    pub nodename: String,
    pub userid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpumem: Option<CpuMemRecord>,
    /// Vswitch-major, nic-minor, in discovery order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nics: Option<Vec<NicRecord>>,
}

impl InstanceStat {
    pub fn with_cpumem(nodename: &str, userid: &str, cpumem: CpuMemRecord) -> Self {
        Self {
            nodename: nodename.to_string(),
            userid: userid.to_string(),
            cpumem: Some(cpumem),
            nics: None,
        }
    }

    pub fn with_nics(nodename: &str, userid: &str, nics: Vec<NicRecord>) -> Self {
        Self {
            nodename: nodename.to_string(),
            userid: userid.to_string(),
            cpumem: None,
            nics: Some(nics),
        }
    }

    /// Folds `incoming` into `self`. A part present in `incoming` replaces
    /// the stored part wholesale; an absent part leaves the stored one alone.
    pub fn merge(&mut self, incoming: InstanceStat) {
        if !incoming.userid.is_empty() {
            self.userid = incoming.userid;
        }
        if let Some(cpumem) = incoming.cpumem {
            self.cpumem = Some(cpumem);
        }
        if let Some(nics) = incoming.nics {
            self.nics = Some(nics);
        }
    }
}

/// CPU view returned by `inspect_cpus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuStats {
    pub number: u64,
    /// Nanoseconds.
    pub time: u64,
}

/// Memory view returned by `inspect_memory_usage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryUsageStats {
    /// MB.
    pub usage: u64,
}

/// Identity of a virtual NIC as exported: `<vswitch>_<userid>_<vdev>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub name: String,
    pub vswitch: String,
    pub vdev: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub rx_drop: u64,
    pub tx_drop: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

impl From<&NicRecord> for InterfaceStats {
    fn from(nic: &NicRecord) -> Self {
        Self {
            rx_bytes: nic.nic_rx,
            rx_packets: nic.nic_fr_rx,
            tx_bytes: nic.nic_tx,
            tx_packets: nic.nic_fr_tx,
            rx_drop: nic.nic_fr_rx_dsc,
            tx_drop: nic.nic_fr_tx_dsc,
            rx_errors: nic.nic_fr_rx_err,
            tx_errors: nic.nic_fr_tx_err,
        }
    }
}

impl Interface {
    pub fn for_nic(userid: &str, nic: &NicRecord) -> Self {
        Self {
            name: format!("{}_{}_{}", nic.vswitch_name, userid, nic.nic_vdev),
            vswitch: nic.vswitch_name.clone(),
            vdev: nic.nic_vdev.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perf(cpus: &str, cpu_time: &str, mem: &str) -> PerfFields {
        PerfFields {
            userid: Some("INST1".into()),
            guest_cpus: Some(cpus.into()),
            used_cpu_time: Some(cpu_time.into()),
            used_memory: Some(mem.into()),
        }
    }

    #[test]
    fn test_cpumem_unit_conversion() {
        let rec = CpuMemRecord::from_perf(&perf("2", "1710205201 uS", "4189268 KB")).unwrap();
        assert_eq!(rec.guest_cpus, 2);
        assert_eq!(rec.used_cpu_time, 1_710_205_201_000);
        assert_eq!(rec.used_memory, 4091);
    }

    #[test]
    fn test_cpumem_non_numeric_is_malformed() {
        let err = CpuMemRecord::from_perf(&perf("s", "1 uS", "1 KB")).unwrap_err();
        assert!(matches!(err, ZvmError::MalformedResponse(_)));
    }

    #[test]
    fn test_cpumem_missing_field_is_malformed() {
        let fields = PerfFields {
            userid: Some("INST1".into()),
            guest_cpus: Some("2".into()),
            ..Default::default()
        };
        let err = CpuMemRecord::from_perf(&fields).unwrap_err();
        assert!(matches!(err, ZvmError::MalformedResponse(_)));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let cpumem = CpuMemRecord {
            guest_cpus: 2,
            used_cpu_time: 10,
            used_memory: 20,
        };
        let nics = vec![NicRecord {
            vswitch_name: "VSW1".into(),
            nic_vdev: "0600".into(),
            nic_rx: 7,
            ..Default::default()
        }];

        let mut a = InstanceStat::with_cpumem("inst1", "INST1", cpumem.clone());
        a.merge(InstanceStat::with_nics("inst1", "INST1", nics.clone()));

        let mut b = InstanceStat::with_nics("inst1", "INST1", nics);
        b.merge(InstanceStat::with_cpumem("inst1", "INST1", cpumem));

        assert_eq!(a, b);
        assert!(a.cpumem.is_some());
        assert_eq!(a.nics.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_interface_mapping() {
        let nic = NicRecord {
            vswitch_name: "vsw1".into(),
            nic_vdev: "0600".into(),
            nic_fr_rx: 1,
            nic_fr_rx_dsc: 2,
            nic_fr_rx_err: 3,
            nic_fr_tx: 4,
            nic_fr_tx_dsc: 5,
            nic_fr_tx_err: 6,
            nic_rx: 7,
            nic_tx: 8,
        };
        let iface = Interface::for_nic("INST1", &nic);
        let stats = InterfaceStats::from(&nic);
        assert_eq!(iface.name, "vsw1_INST1_0600");
        assert_eq!(stats.rx_packets, 1);
        assert_eq!(stats.rx_drop, 2);
        assert_eq!(stats.rx_errors, 3);
        assert_eq!(stats.tx_bytes, 8);
    }
}
