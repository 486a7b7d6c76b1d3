//! Per-process detail shown in the `d` overlay.

use serde::Serialize;

use super::entity::join_ports;

/// Environment variables listed, sorted by name.
pub const DETAIL_ENV_LIMIT: usize = 30;

/// Longest environment value shown before it is cut.
const ENV_VALUE_MAX: usize = 80;

const MIB: f64 = 1024.0 * 1024.0;

/// One process looked at closely. Fields the OS would not disclose are
/// `None` and render as `N/A`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDetail {
    pub pid: u32,
    pub name: String,
    pub status: String,
    pub user: Option<String>,
    pub cwd: Option<String>,
    pub cpu_percent: f32,
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
    pub threads: Option<usize>,
    pub command: String,
    pub ports: Vec<u16>,
    /// Descendants, depth first, as `(pid, name)`.
    pub children: Vec<(u32, String)>,
    /// Sorted by name.
    pub environment: Vec<(String, String)>,
}

impl ProcessDetail {
    /// `node (PID 42)`
    pub fn title(&self) -> String {
        format!("{} (PID {})", self.name, self.pid)
    }

    /// The overlay body, one entry per line.
    pub fn lines(&self) -> Vec<String> {
        let na = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".to_string());

        let mut lines = vec![
            format!("PID:     {}", self.pid),
            format!("Name:    {}", self.name),
            format!("Status:  {}", self.status),
            format!("User:    {}", na(&self.user)),
            format!("CWD:     {}", na(&self.cwd)),
            format!("CPU %:   {:.1}%", self.cpu_percent),
            format!("RSS:     {:.1} MB", self.rss_bytes as f64 / MIB),
            format!("VMS:     {:.1} MB", self.virtual_bytes as f64 / MIB),
            format!(
                "Threads: {}",
                self.threads.map_or_else(|| "N/A".to_string(), |n| n.to_string())
            ),
            String::new(),
            format!("Command: {}", self.command),
        ];

        if !self.ports.is_empty() {
            lines.push(format!("Ports:   {}", join_ports(&self.ports)));
        }

        if !self.children.is_empty() {
            lines.push(String::new());
            lines.push(format!("Children ({}):", self.children.len()));
            lines.extend(
                self.children
                    .iter()
                    .map(|(pid, name)| format!("  PID {}: {}", pid, name)),
            );
        }

        if !self.environment.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "Environment ({} vars, first {}):",
                self.environment.len(),
                DETAIL_ENV_LIMIT
            ));
            lines.extend(
                self.environment
                    .iter()
                    .take(DETAIL_ENV_LIMIT)
                    .map(|(key, value)| format!("  {}={}", key, cut_value(value))),
            );
        }
        lines
    }
}

fn cut_value(value: &str) -> String {
    if value.chars().count() <= ENV_VALUE_MAX {
        return value.to_string();
    }
    let kept: String = value.chars().take(ENV_VALUE_MAX - 3).collect();
    format!("{}...", kept)
}
