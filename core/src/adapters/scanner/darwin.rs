//! macOS listener scanner implementation using lsof.

use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

use super::utils::parse_port;
use super::{ListenerMap, ListenerMapBuilder, Scanner};

/// macOS-specific listener scanner using lsof.
pub struct DarwinScanner;

impl DarwinScanner {
    /// Create a new macOS scanner.
    pub fn new() -> Self {
        Self
    }

    /// Parse `lsof -iTCP -sTCP:LISTEN -P -n` output.
    fn parse_lsof_output(&self, output: &str) -> ListenerMap {
        let mut builder = ListenerMapBuilder::default();

        for line in output.lines().skip(1) {
            let components: Vec<&str> = line.split_whitespace().collect();
            if components.len() < 9 {
                continue;
            }

            let pid: u32 = match components[1].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };

            let address = components[8..]
                .iter()
                .rev()
                .find(|c| c.contains(':') && !c.starts_with("0x") && !c.starts_with("0t"));

            if let Some(port) = address.and_then(|a| parse_port(a)) {
                builder.insert(pid, port);
            }
        }

        builder.build()
    }
}

impl Default for DarwinScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for DarwinScanner {
    async fn scan(&self) -> Result<ListenerMap> {
        let output = Command::new("/usr/sbin/lsof")
            .args(["-iTCP", "-sTCP:LISTEN", "-P", "-n", "+c", "0"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::ProviderUnavailable("lsof is not installed".to_string())
                }
                _ => Error::CommandFailed(format!("Failed to run lsof: {}", e)),
            })?;

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in lsof output: {}", e)))?;

        Ok(self.parse_lsof_output(&stdout))
    }
}
