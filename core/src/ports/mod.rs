//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the application layer uses
//! to interact with external systems. Implementations live in `adapters`.

mod mutation;
mod provider;

pub use mutation::MutationPort;
pub use provider::SnapshotProvider;
