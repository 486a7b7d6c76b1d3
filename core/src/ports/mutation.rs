//! Mutation port (interface).

use crate::error::Result;

/// Port for the only mutations the dashboard performs on monitored entities.
pub trait MutationPort: Send + Sync {
    /// Terminate a process: graceful signal, bounded grace period, then one
    /// forceful kill if it is still alive.
    ///
    /// Returns `Ok(true)` when the process is gone afterwards.
    fn terminate_process(&self, pid: u32)
        -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Stop a container with a bounded timeout.
    ///
    /// Returns `Ok(true)` when the runtime reported success.
    fn stop_container(&self, id: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
}
