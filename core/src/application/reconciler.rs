//! Snapshot diffing.
//!
//! Keeps one baseline per reconciled table and turns each new live snapshot
//! into appearance, disappearance and watched-port events.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{Entity, EntityKey, ReconcileEvent, Snapshot, TableId, WatchSet};

/// Derives events from consecutive snapshots of the same table.
#[derive(Debug, Default)]
pub struct Reconciler {
    watched: WatchSet,
    baselines: HashMap<TableId, Snapshot>,
}

impl Reconciler {
    pub fn new(watched: WatchSet) -> Self {
        Self {
            watched,
            baselines: HashMap::new(),
        }
    }

    pub fn watched(&self) -> &WatchSet {
        &self.watched
    }

    /// The snapshot new data is compared against, if one exists yet.
    pub fn baseline(&self, table: TableId) -> Option<&Snapshot> {
        self.baselines.get(&table)
    }

    /// Diff `snapshot` against the table's baseline, then make it the
    /// baseline.
    ///
    /// The first live snapshot of a table only seeds the baseline.
    /// Unavailable snapshots are ignored entirely so a provider outage does
    /// not read as every entity vanishing. Appeared and watched-port events
    /// follow the new snapshot's order; vanished events follow the old one's.
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> Vec<ReconcileEvent> {
        let table = snapshot.table();
        if !table.is_reconciled() {
            return Vec::new();
        }
        if !snapshot.is_live() {
            debug!(table = %table, "Snapshot unavailable, baseline kept");
            return Vec::new();
        }

        let Some(previous) = self.baselines.insert(table, snapshot.clone()) else {
            debug!(table = %table, entities = snapshot.len(), "Baseline seeded");
            return Vec::new();
        };

        let events = diff(table, &previous, snapshot, &self.watched);
        if !events.is_empty() {
            debug!(table = %table, events = events.len(), "Reconciled snapshot");
        }
        events
    }
}

fn diff(
    table: TableId,
    previous: &Snapshot,
    current: &Snapshot,
    watched: &WatchSet,
) -> Vec<ReconcileEvent> {
    let before: HashMap<&EntityKey, &Entity> =
        previous.entities().iter().map(|e| (&e.key, e)).collect();
    let after: HashMap<&EntityKey, &Entity> =
        current.entities().iter().map(|e| (&e.key, e)).collect();

    let mut events = Vec::new();

    for entity in current.entities() {
        let held_before: &[u16] = match before.get(&entity.key) {
            Some(old) => &old.ports,
            None => {
                events.push(ReconcileEvent::Appeared {
                    table,
                    entity: entity.clone(),
                });
                &[]
            }
        };

        for port in watched.matching(&entity.ports) {
            if !held_before.contains(&port) {
                events.push(ReconcileEvent::WatchedPortActivated {
                    table,
                    entity: entity.clone(),
                    port,
                });
            }
        }
    }

    for entity in previous.entities() {
        if !after.contains_key(&entity.key) {
            events.push(ReconcileEvent::Vanished {
                table,
                entity: entity.clone(),
            });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn procs(list: &[(u32, &[u16])]) -> Snapshot {
        Snapshot::live(
            TableId::DevProcesses,
            list.iter()
                .map(|(pid, ports)| Entity::process(*pid, "node").with_ports(ports.iter().copied()))
                .collect(),
        )
    }

    fn keys(events: &[ReconcileEvent]) -> Vec<(&'static str, EntityKey)> {
        events
            .iter()
            .map(|e| {
                let kind = match e {
                    ReconcileEvent::Appeared { .. } => "appeared",
                    ReconcileEvent::Vanished { .. } => "vanished",
                    ReconcileEvent::WatchedPortActivated { .. } => "watched",
                };
                (kind, e.key().clone())
            })
            .collect()
    }

    #[test]
    fn test_first_snapshot_emits_nothing() {
        let mut reconciler = Reconciler::default();
        assert!(reconciler.reconcile(&procs(&[(1, &[]), (2, &[3000])])).is_empty());
        assert_eq!(reconciler.baseline(TableId::DevProcesses).unwrap().len(), 2);
    }

    #[test]
    fn test_appeared_then_vanished() {
        let mut reconciler = Reconciler::default();
        reconciler.reconcile(&procs(&[(1, &[])]));

        let events = reconciler.reconcile(&procs(&[(1, &[]), (2, &[])]));
        assert_eq!(keys(&events), vec![("appeared", EntityKey::Pid(2))]);

        let events = reconciler.reconcile(&procs(&[(1, &[])]));
        assert_eq!(keys(&events), vec![("vanished", EntityKey::Pid(2))]);
    }

    #[test]
    fn test_watched_port_activation_and_exit() {
        let mut reconciler = Reconciler::new([3000].into_iter().collect());
        assert!(reconciler.reconcile(&procs(&[(100, &[])])).is_empty());

        let events = reconciler.reconcile(&procs(&[(100, &[3000])]));
        assert_eq!(events.len(), 1);
        match &events[0] {
            ReconcileEvent::WatchedPortActivated { entity, port, .. } => {
                assert_eq!(entity.key, EntityKey::Pid(100));
                assert_eq!(*port, 3000);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // Still holding the port: no repeat alert.
        assert!(reconciler.reconcile(&procs(&[(100, &[3000])])).is_empty());

        let events = reconciler.reconcile(&procs(&[]));
        assert_eq!(keys(&events), vec![("vanished", EntityKey::Pid(100))]);
        match &events[0] {
            ReconcileEvent::Vanished { entity, .. } => assert_eq!(entity.ports, vec![3000]),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_appeared_entity_on_watched_port_alerts() {
        let mut reconciler = Reconciler::new([5173].into_iter().collect());
        reconciler.reconcile(&procs(&[]));

        let events = reconciler.reconcile(&procs(&[(7, &[5173, 9229])]));
        assert_eq!(
            keys(&events),
            vec![("appeared", EntityKey::Pid(7)), ("watched", EntityKey::Pid(7))]
        );
    }

    #[test]
    fn test_event_order_is_deterministic() {
        let mut reconciler = Reconciler::default();
        reconciler.reconcile(&procs(&[(1, &[]), (2, &[]), (3, &[])]));

        let events = reconciler.reconcile(&procs(&[(9, &[]), (2, &[]), (8, &[])]));
        assert_eq!(
            keys(&events),
            vec![
                ("appeared", EntityKey::Pid(9)),
                ("appeared", EntityKey::Pid(8)),
                ("vanished", EntityKey::Pid(1)),
                ("vanished", EntityKey::Pid(3)),
            ]
        );
    }

    #[test]
    fn test_unavailable_snapshot_keeps_baseline() {
        let mut reconciler = Reconciler::default();
        let running = Snapshot::live(
            TableId::Containers,
            vec![Entity::container("abc", "db"), Entity::container("def", "web")],
        );
        reconciler.reconcile(&running);

        let outage = Snapshot::unavailable(TableId::Containers, "docker daemon down");
        assert!(reconciler.reconcile(&outage).is_empty());
        assert_eq!(reconciler.baseline(TableId::Containers).unwrap().len(), 2);

        // Recovery with the same containers reports nothing.
        assert!(reconciler.reconcile(&running).is_empty());
    }

    #[test]
    fn test_unavailable_first_snapshot_does_not_seed() {
        let mut reconciler = Reconciler::default();
        reconciler.reconcile(&Snapshot::unavailable(TableId::Containers, "no docker"));
        assert!(reconciler.baseline(TableId::Containers).is_none());

        let first_live = Snapshot::live(TableId::Containers, vec![Entity::container("abc", "db")]);
        assert!(reconciler.reconcile(&first_live).is_empty());
    }

    #[test]
    fn test_reused_pid_with_same_key_is_not_an_event() {
        // Identity is the key alone; a recycled pid looks like the same entity.
        let mut reconciler = Reconciler::default();
        reconciler.reconcile(&procs(&[(42, &[])]));
        let recycled = Snapshot::live(
            TableId::DevProcesses,
            vec![Entity::process(42, "something-else")],
        );
        assert!(reconciler.reconcile(&recycled).is_empty());
    }

    #[test]
    fn test_all_processes_table_is_not_reconciled() {
        let mut reconciler = Reconciler::default();
        let snapshot = Snapshot::live(TableId::AllProcesses, vec![Entity::process(1, "init")]);
        reconciler.reconcile(&snapshot);
        assert!(reconciler.reconcile(&Snapshot::live(TableId::AllProcesses, vec![])).is_empty());
        assert!(reconciler.baseline(TableId::AllProcesses).is_none());
    }
}
