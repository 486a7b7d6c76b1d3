//! Snapshot domain model.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::{Entity, EntityKey, TableId};

/// Whether a snapshot reflects real data or a missing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum Availability {
    /// The provider answered; the entity list is authoritative.
    Live,
    /// The provider could not be reached; the entity list is empty and must
    /// not be read as "everything vanished".
    Unavailable(String),
}

/// An immutable, timestamped collection of entities for one table.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    table: TableId,
    taken_at: DateTime<Utc>,
    availability: Availability,
    entities: Vec<Entity>,
}

impl Snapshot {
    /// Build a live snapshot.
    ///
    /// Duplicate identity keys are dropped (first occurrence wins), so keys
    /// are unique within every snapshot.
    pub fn live(table: TableId, entities: Vec<Entity>) -> Self {
        let mut seen: HashSet<EntityKey> = HashSet::with_capacity(entities.len());
        let before = entities.len();
        let entities: Vec<Entity> = entities
            .into_iter()
            .filter(|e| seen.insert(e.key.clone()))
            .collect();
        if entities.len() != before {
            debug!(
                table = %table,
                dropped = before - entities.len(),
                "Dropped duplicate identity keys"
            );
        }

        Self {
            table,
            taken_at: Utc::now(),
            availability: Availability::Live,
            entities,
        }
    }

    /// Build an empty snapshot for a provider that could not answer.
    pub fn unavailable(table: TableId, reason: impl Into<String>) -> Self {
        Self {
            table,
            taken_at: Utc::now(),
            availability: Availability::Unavailable(reason.into()),
            entities: Vec::new(),
        }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn is_live(&self) -> bool {
        self.availability == Availability::Live
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Find an entity by identity key.
    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.iter().find(|e| &e.key == key)
    }

    /// Identity keys in snapshot order.
    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entities.iter().map(|e| &e.key)
    }
}
