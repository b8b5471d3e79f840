//! Running statistics over poll cycles, rendered as the `/health` table.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use zvm_perf_exporter::RefreshCounters;

#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (current, average, max, min, count)
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

pub struct HealthStats {
    polled_instances: Stat,
    skipped_instances: Stat,
    poll_duration_seconds: Stat,
    scrape_duration_seconds: Stat,
    total_polls: AtomicU64,
    failed_polls: AtomicU64,
    http_requests: AtomicU64,
    started: Instant,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            polled_instances: Stat::default(),
            skipped_instances: Stat::default(),
            poll_duration_seconds: Stat::default(),
            scrape_duration_seconds: Stat::default(),
            total_polls: AtomicU64::new(0),
            failed_polls: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_poll(&self, polled: u64, skipped: u64, duration_seconds: f64) {
        self.polled_instances.add_sample(polled as f64);
        self.skipped_instances.add_sample(skipped as f64);
        self.poll_duration_seconds.add_sample(duration_seconds);
        self.total_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_poll(&self) {
        self.total_polls.fetch_add(1, Ordering::Relaxed);
        self.failed_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scrape(&self, duration_seconds: f64) {
        self.scrape_duration_seconds.add_sample(duration_seconds);
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn failed_polls(&self) -> u64 {
        self.failed_polls.load(Ordering::Relaxed)
    }

    pub fn render_table(&self, counters: &RefreshCounters) -> String {
        let left_col = 26usize;
        let col_w = 12usize;
        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        let rows: [(&str, &Stat, usize); 4] = [
            ("polled instances", &self.polled_instances, 0),
            ("skipped instances", &self.skipped_instances, 0),
            ("poll duration (s)", &self.poll_duration_seconds, 3),
            ("scrape duration (s)", &self.scrape_duration_seconds, 3),
        ];
        for (label, stat, precision) in rows {
            let (cur, avg, max, min, _count) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.*}", precision, cur),
                format!("{:.*}", precision.max(1), avg),
                format!("{:.*}", precision, max),
                format!("{:.*}", precision, min),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "number of polls: {} ({} failed)",
            self.total_polls.load(Ordering::Relaxed),
            self.failed_polls()
        )
        .ok();
        writeln!(
            out,
            "cache refreshes: {} full, {} targeted, {} nic",
            counters.full, counters.targeted, counters.nics
        )
        .ok();
        writeln!(
            out,
            "http requests: {}",
            self.http_requests.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(out, "uptime: {}s", self.get_uptime_seconds()).ok();

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stat() {
        let mut s = RunningStat::default();
        assert_eq!(s.avg(), 0.0);
        s.add(4.0);
        s.add(2.0);
        s.add(6.0);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 6.0);
        assert_eq!(s.last, 6.0);
        assert_eq!(s.avg(), 4.0);
    }

    #[test]
    fn test_render_table() {
        let stats = HealthStats::new();
        stats.record_poll(12, 1, 0.25);
        stats.record_failed_poll();
        let counters = RefreshCounters {
            full: 1,
            targeted: 2,
            nics: 3,
        };
        let table = stats.render_table(&counters);
        assert!(table.contains("polled instances"));
        assert!(table.contains("number of polls: 2 (1 failed)"));
        assert!(table.contains("cache refreshes: 1 full, 2 targeted, 3 nic"));
    }
}
