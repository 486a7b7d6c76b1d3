//! Aggregate system stats.

use serde::Serialize;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Host-wide metrics captured once per system poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateStats {
    pub cpu_percent: f64,
    pub cpu_count: usize,
    pub memory_total_gb: f64,
    pub memory_used_gb: f64,
    pub memory_percent: f64,
    pub swap_total_gb: f64,
    pub swap_used_gb: f64,
    pub swap_percent: f64,
    pub disk_total_gb: f64,
    pub disk_used_gb: f64,
    pub disk_free_gb: f64,
    pub disk_percent: f64,
    /// Bytes per second sent; absent until two samples exist.
    pub net_sent_per_sec: Option<f64>,
    /// Bytes per second received; absent until two samples exist.
    pub net_recv_per_sec: Option<f64>,
}

impl AggregateStats {
    /// Convert a byte count to GiB.
    pub fn gib(bytes: u64) -> f64 {
        bytes as f64 / GIB
    }

    /// `used / total` as a percentage, 0 when `total` is 0.
    pub fn percent(used: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        }
    }

    /// One-line summary for the status bar.
    pub fn summary(&self) -> String {
        format!(
            "CPU {:.0}% | Mem {:.1}/{:.1}GB | Disk {:.0}%",
            self.cpu_percent, self.memory_used_gb, self.memory_total_gb, self.disk_percent
        )
    }

    /// `↑ 1.2 KB/s ↓ 3.4 MB/s`, or `-` before the second sample.
    pub fn network_label(&self) -> String {
        match (self.net_sent_per_sec, self.net_recv_per_sec) {
            (Some(sent), Some(recv)) => format!(
                "↑ {}  ↓ {}",
                format_bytes_rate(sent),
                format_bytes_rate(recv)
            ),
            _ => "-".to_string(),
        }
    }
}

/// Human-readable byte rate.
pub fn format_bytes_rate(bps: f64) -> String {
    if bps < 1024.0 {
        format!("{:.0} B/s", bps)
    } else if bps < 1024.0 * 1024.0 {
        format!("{:.1} KB/s", bps / 1024.0)
    } else {
        format!("{:.1} MB/s", bps / (1024.0 * 1024.0))
    }
}
