//! Watched port domain model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// User-designated ports that raise an alert when an entity binds them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchSet(BTreeSet<u16>);

impl WatchSet {
    /// Create an empty watch set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a port is watched.
    pub fn contains(&self, port: u16) -> bool {
        self.0.contains(&port)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Add a port; returns false if it was already watched.
    pub fn insert(&mut self, port: u16) -> bool {
        self.0.insert(port)
    }

    /// Watched ports in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    /// The subset of `ports` that is watched, in the given order.
    pub fn matching<'a>(&'a self, ports: &'a [u16]) -> impl Iterator<Item = u16> + 'a {
        ports.iter().copied().filter(|p| self.contains(*p))
    }
}

impl FromIterator<u16> for WatchSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for WatchSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(none)");
        }
        let ports = self
            .0
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", ports)
    }
}
