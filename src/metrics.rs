//! Prometheus metric families for z/VM guests.

use prometheus::{Gauge, GaugeVec, Opts, Registry};

use zvm_perf_exporter::stats::{Interface, InterfaceStats};
use zvm_perf_exporter::{Config, InstanceStat};

const NS_PER_SECOND: f64 = 1_000_000_000.0;

/// Per-guest gauges.
#[derive(Clone)]
pub struct VmMetrics {
    pub guest_cpus: GaugeVec,
    pub cpu_time: GaugeVec,
    pub memory_used: GaugeVec,

    // vNIC counters, one series per interface
    pub nic_rx_bytes: GaugeVec,
    pub nic_tx_bytes: GaugeVec,
    pub nic_rx_packets: GaugeVec,
    pub nic_tx_packets: GaugeVec,
    pub nic_rx_drop: GaugeVec,
    pub nic_tx_drop: GaugeVec,
    pub nic_rx_errors: GaugeVec,
    pub nic_tx_errors: GaugeVec,
}

fn gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<GaugeVec> {
    let g = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

impl VmMetrics {
    /// Creates and registers all guest metrics with the registry.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let guest = &["nodename", "userid"];
        let nic = &["nodename", "userid", "interface", "vswitch", "vdev"];

        Ok(Self {
            guest_cpus: gauge_vec(
                registry,
                "zvm_guest_cpus",
                "Number of virtual CPUs defined for the guest",
                guest,
            )?,
            cpu_time: gauge_vec(
                registry,
                "zvm_guest_cpu_time_seconds",
                "CPU time used by the guest",
                guest,
            )?,
            memory_used: gauge_vec(
                registry,
                "zvm_guest_memory_used_megabytes",
                "Memory used by the guest in MB",
                guest,
            )?,
            nic_rx_bytes: gauge_vec(
                registry,
                "zvm_guest_nic_receive_bytes",
                "Bytes received on the virtual NIC",
                nic,
            )?,
            nic_tx_bytes: gauge_vec(
                registry,
                "zvm_guest_nic_transmit_bytes",
                "Bytes transmitted on the virtual NIC",
                nic,
            )?,
            nic_rx_packets: gauge_vec(
                registry,
                "zvm_guest_nic_receive_packets",
                "Frames received on the virtual NIC",
                nic,
            )?,
            nic_tx_packets: gauge_vec(
                registry,
                "zvm_guest_nic_transmit_packets",
                "Frames transmitted on the virtual NIC",
                nic,
            )?,
            nic_rx_drop: gauge_vec(
                registry,
                "zvm_guest_nic_receive_drop",
                "Received frames discarded on the virtual NIC",
                nic,
            )?,
            nic_tx_drop: gauge_vec(
                registry,
                "zvm_guest_nic_transmit_drop",
                "Transmit frames discarded on the virtual NIC",
                nic,
            )?,
            nic_rx_errors: gauge_vec(
                registry,
                "zvm_guest_nic_receive_errors",
                "Receive errors on the virtual NIC",
                nic,
            )?,
            nic_tx_errors: gauge_vec(
                registry,
                "zvm_guest_nic_transmit_errors",
                "Transmit errors on the virtual NIC",
                nic,
            )?,
        })
    }

    /// Resets all metrics (guests that disappeared must not linger).
    pub fn reset(&self) {
        for g in [
            &self.guest_cpus,
            &self.cpu_time,
            &self.memory_used,
            &self.nic_rx_bytes,
            &self.nic_tx_bytes,
            &self.nic_rx_packets,
            &self.nic_tx_packets,
            &self.nic_rx_drop,
            &self.nic_tx_drop,
            &self.nic_rx_errors,
            &self.nic_tx_errors,
        ] {
            g.reset();
        }
    }

    /// Sets every enabled metric for one guest.
    pub fn set_for_instance(&self, stat: &InstanceStat, cfg: &Config) {
        let labels = &[stat.nodename.as_str(), stat.userid.as_str()];

        if let Some(cpumem) = &stat.cpumem {
            if cfg.enable_cpu() {
                self.guest_cpus
                    .with_label_values(labels)
                    .set(cpumem.guest_cpus as f64);
                self.cpu_time
                    .with_label_values(labels)
                    .set(cpumem.used_cpu_time as f64 / NS_PER_SECOND);
            }
            if cfg.enable_memory() {
                self.memory_used
                    .with_label_values(labels)
                    .set(cpumem.used_memory as f64);
            }
        }

        if !cfg.enable_nics() {
            return;
        }
        for nic in stat.nics.iter().flatten() {
            let iface = Interface::for_nic(&stat.userid, nic);
            let s = InterfaceStats::from(nic);
            let labels = &[
                stat.nodename.as_str(),
                stat.userid.as_str(),
                iface.name.as_str(),
                iface.vswitch.as_str(),
                iface.vdev.as_str(),
            ];
            for (g, v) in [
                (&self.nic_rx_bytes, s.rx_bytes),
                (&self.nic_tx_bytes, s.tx_bytes),
                (&self.nic_rx_packets, s.rx_packets),
                (&self.nic_tx_packets, s.tx_packets),
                (&self.nic_rx_drop, s.rx_drop),
                (&self.nic_tx_drop, s.tx_drop),
                (&self.nic_rx_errors, s.rx_errors),
                (&self.nic_tx_errors, s.tx_errors),
            ] {
                g.with_label_values(labels).set(v as f64);
            }
        }
    }
}

/// Exporter self-metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    pub scrape_duration: Gauge,
    pub instances_total: Gauge,
    pub cache_update_duration: Gauge,
    pub cache_update_success: Gauge,
    pub cache_updating: Gauge,
    pub full_refreshes: Gauge,
    pub targeted_refreshes: Gauge,
    pub nic_refreshes: Gauge,
}

impl ExporterMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let gauge = |name: &str, help: &str| -> prometheus::Result<Gauge> {
            let g = Gauge::new(name, help)?;
            registry.register(Box::new(g.clone()))?;
            Ok(g)
        };

        Ok(Self {
            scrape_duration: gauge(
                "zvm_exporter_scrape_duration_seconds",
                "Time spent serving /metrics request (reading from cache)",
            )?,
            instances_total: gauge(
                "zvm_exporter_instances_total",
                "Number of guests currently exported",
            )?,
            cache_update_duration: gauge(
                "zvm_exporter_cache_update_duration_seconds",
                "Time spent in the last poll cycle",
            )?,
            cache_update_success: gauge(
                "zvm_exporter_cache_update_success",
                "Whether the last poll cycle was successful (1) or failed (0)",
            )?,
            cache_updating: gauge(
                "zvm_exporter_cache_updating",
                "Whether a poll cycle is currently in progress (1) or idle (0)",
            )?,
            full_refreshes: gauge(
                "zvm_exporter_full_refreshes",
                "Full cache refreshes since startup",
            )?,
            targeted_refreshes: gauge(
                "zvm_exporter_targeted_refreshes",
                "Single-guest CPU/memory refreshes since startup",
            )?,
            nic_refreshes: gauge(
                "zvm_exporter_nic_refreshes",
                "Vswitch queries since startup",
            )?,
        })
    }
}
