//! devdash Core Library
//!
//! Live-state reconciliation engine behind the devdash terminal dashboard.
//! Provides functionality to:
//! - Sample dev processes, docker containers, all processes and system load
//! - Diff successive snapshots into appearance, exit and watched-port events
//! - Filter, sort and select rows per table
//! - Kill processes (SIGTERM, grace period, SIGKILL) and stop containers
//! - Load configuration and export snapshots as JSON
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models and event derivation
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: sysinfo, `ss`/`lsof`, docker CLI and signal implementations
//! - `application`: Poller, reconciler, view state, actions and the dashboard
//!
//! # Platform Support
//! - Linux: listening ports via `ss`
//! - macOS: listening ports via `lsof`
//! - Other: process and container tables without ports

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-export domain types (primary API)
pub use domain::{
    AggregateStats, Availability, Entity, EntityKey, Notification, PollGroup, ProcessDetail,
    ReconcileEvent, Severity, Snapshot, TableId, WatchSet,
};

// Re-export other commonly used types
pub use adapters::{DockerCli, LocalHost, LogTail, ProcessKiller, SystemProvider};
pub use application::{Dashboard, DashboardOptions};
pub use config::{Config, ConfigStore};
pub use error::{Error, Result};
pub use ports::{MutationPort, SnapshotProvider};
