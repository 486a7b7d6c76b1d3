//! Error types for the devdash-core library.

use thiserror::Error;

/// Result type alias for devdash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while sampling, acting on, or exporting live state.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to execute a system command.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// Failed to parse command output.
    #[error("Failed to parse output: {0}")]
    ParseError(String),

    /// Failed to kill a process.
    #[error("Failed to kill process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    /// The process exited before it could be inspected.
    #[error("Process {0} no longer exists")]
    ProcessNotFound(u32),

    /// Permission denied for an operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// An external tool (docker, ss, lsof) is not installed or not reachable.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// An external operation exceeded its hard ceiling.
    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Platform not supported.
    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),

    /// The engine could not be wired up (no runtime for the hand-off channel).
    #[error("Startup failed: {0}")]
    Startup(String),
}

impl Error {
    /// Whether this error means "the data source is missing" rather than
    /// "the data source misbehaved".
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable(_) | Error::UnsupportedPlatform(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::KillFailed {
            pid: 1234,
            reason: "still running".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to kill process 1234: still running");

        let err = Error::Timeout {
            what: "docker stop".to_string(),
            secs: 15,
        };
        assert_eq!(err.to_string(), "docker stop timed out after 15s");
    }

    #[test]
    fn test_is_unavailable() {
        assert!(Error::ProviderUnavailable("docker".into()).is_unavailable());
        assert!(!Error::CommandFailed("boom".into()).is_unavailable());
    }
}
