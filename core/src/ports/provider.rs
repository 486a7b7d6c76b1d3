//! Snapshot provider port (interface).

use crate::domain::{AggregateStats, Entity};
use crate::error::Result;

/// Port for sampling live OS and container state.
///
/// Implementations skip entities that vanish or deny access mid-enumeration
/// and only return `Err` when the whole source is unusable. A missing tool
/// should be reported as `Error::ProviderUnavailable` so the table degrades
/// to "no data" instead of looking empty.
pub trait SnapshotProvider: Send + Sync {
    /// Processes matching the configured interest patterns, heaviest first.
    fn list_processes_of_interest(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Entity>>> + Send;

    /// Running containers.
    fn list_containers(&self) -> impl std::future::Future<Output = Result<Vec<Entity>>> + Send;

    /// Every process, heaviest first, truncated to `limit`.
    fn list_all_processes(
        &self,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Entity>>> + Send;

    /// Host-wide CPU, memory, disk and network metrics.
    fn aggregate_stats(&self) -> impl std::future::Future<Output = Result<AggregateStats>> + Send;
}
