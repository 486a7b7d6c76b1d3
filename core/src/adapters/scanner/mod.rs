//! Listening-port scanner adapters.
//!
//! Platform-specific discovery of which process listens on which TCP port.
//! The result only annotates processes; it never decides which processes
//! exist.

#[cfg(target_os = "macos")]
mod darwin;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
mod unsupported;

mod utils;

use std::collections::HashMap;

use crate::error::Result;

/// Listening TCP ports keyed by owning pid. Port lists are sorted and unique.
pub type ListenerMap = HashMap<u32, Vec<u16>>;

/// The main listener scanner that uses platform-specific implementations.
pub struct PortScanner {
    #[cfg(target_os = "macos")]
    inner: darwin::DarwinScanner,

    #[cfg(target_os = "linux")]
    inner: linux::LinuxScanner,

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    inner: unsupported::UnsupportedScanner,
}

impl PortScanner {
    /// Create a new listener scanner for the current platform.
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "macos")]
            inner: darwin::DarwinScanner::new(),

            #[cfg(target_os = "linux")]
            inner: linux::LinuxScanner::new(),

            #[cfg(not(any(target_os = "macos", target_os = "linux")))]
            inner: unsupported::UnsupportedScanner,
        }
    }

    /// Scan all listening TCP sockets and group their ports by pid.
    pub async fn scan(&self) -> Result<ListenerMap> {
        self.inner.scan().await
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal trait for platform-specific implementations.
trait Scanner: Send + Sync {
    fn scan(&self) -> impl std::future::Future<Output = Result<ListenerMap>> + Send;
}

/// Collects `(pid, port)` pairs into a [`ListenerMap`].
#[derive(Default)]
struct ListenerMapBuilder {
    map: ListenerMap,
}

impl ListenerMapBuilder {
    fn insert(&mut self, pid: u32, port: u16) {
        self.map.entry(pid).or_default().push(port);
    }

    fn build(mut self) -> ListenerMap {
        for ports in self.map.values_mut() {
            ports.sort_unstable();
            ports.dedup();
        }
        self.map
    }
}
