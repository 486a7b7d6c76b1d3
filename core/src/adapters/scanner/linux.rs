//! Linux listener scanner implementation using ss.

use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;

use crate::error::{Error, Result};

use super::utils::parse_port;
use super::{ListenerMap, ListenerMapBuilder, Scanner};

/// Linux-specific listener scanner.
pub struct LinuxScanner;

/// Matches one `("name",pid=123,fd=4)` owner inside an ss `users:(...)` column.
fn owner_regex() -> &'static Regex {
    static OWNER: OnceLock<Regex> = OnceLock::new();
    OWNER.get_or_init(|| Regex::new(r#"\("[^"]*",pid=(\d+),fd=\d+\)"#).expect("valid regex"))
}

impl LinuxScanner {
    pub fn new() -> Self {
        Self
    }

    /// Parse `ss -Htlnp` output.
    ///
    /// Sockets owned by other users show no `users:` column unless ss runs
    /// as root; those lines are skipped. A socket shared by several
    /// processes (pre-fork servers) is credited to every owner.
    fn parse_ss_output(&self, output: &str) -> ListenerMap {
        let mut builder = ListenerMapBuilder::default();

        for line in output.lines() {
            let components: Vec<&str> = line.split_whitespace().collect();
            if components.len() < 6 {
                continue;
            }

            let Some(port) = parse_port(components[3]) else {
                continue;
            };

            let users = components[5..].join(" ");
            for caps in owner_regex().captures_iter(&users) {
                if let Ok(pid) = caps[1].parse::<u32>() {
                    builder.insert(pid, port);
                }
            }
        }

        builder.build()
    }
}

impl Default for LinuxScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for LinuxScanner {
    async fn scan(&self) -> Result<ListenerMap> {
        let output = Command::new("ss")
            .args(["-Htlnp"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::ProviderUnavailable("ss is not installed".to_string())
                }
                _ => Error::CommandFailed(format!("Failed to run ss: {}", e)),
            })?;

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in ss output: {}", e)))?;

        Ok(self.parse_ss_output(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ss_output() {
        let scanner = LinuxScanner::new();
        let output = r#"LISTEN 0      511          *:3000        *:*    users:(("node",pid=1234,fd=20))
LISTEN 0      4096   127.0.0.53%lo:53       0.0.0.0:*
LISTEN 0      511      [::1]:5173       [::]:*    users:(("node",pid=1234,fd=23))
LISTEN 0      128    0.0.0.0:8080     0.0.0.0:*    users:(("gunicorn",pid=10,fd=5),("gunicorn",pid=11,fd=5))
"#;

        let map = scanner.parse_ss_output(output);
        assert_eq!(map.len(), 3);
        assert_eq!(map[&1234], vec![3000, 5173]);
        assert_eq!(map[&10], vec![8080]);
        assert_eq!(map[&11], vec![8080]);
    }

    #[test]
    fn test_parse_ss_output_ignores_short_lines() {
        let scanner = LinuxScanner::new();
        assert!(scanner.parse_ss_output("garbage\n\n").is_empty());
    }
}
