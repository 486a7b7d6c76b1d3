//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`.
//! Each adapter handles communication with external systems.

pub mod docker;
pub mod host;
pub mod killer;
pub mod scanner;
pub mod system;

// Re-export main types for convenience
pub use docker::{DockerCli, LogTail};
pub use host::LocalHost;
pub use killer::{ProcessKiller, SignalOutcome, SignalSender};
pub use scanner::PortScanner;
pub use system::SystemProvider;

/// Cut `text` to `max` characters, ending in `...` when shortened.
pub(crate) fn truncate_display(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
