//! Domain layer - Pure business logic and data models.
//!
//! This module contains the types the engine reasons about: observed
//! entities, per-table snapshots, aggregate stats, the watch set and the
//! events derived from diffing snapshots. Nothing here performs I/O.

mod detail;
mod entity;
mod event;
mod snapshot;
mod stats;
mod table;
mod watched;

// Re-export all domain types
pub use detail::{ProcessDetail, DETAIL_ENV_LIMIT};
pub use entity::{Entity, EntityKey, Field};
pub(crate) use entity::{join_ports, short_id};
pub use event::{Notification, ReconcileEvent, Severity, NOTIFICATION_DURATION};
pub use snapshot::{Availability, Snapshot};
pub use stats::{format_bytes_rate, AggregateStats};
pub use table::{PollGroup, TableId};
pub use watched::WatchSet;
