//! Reconciliation events and the notifications derived from them.

use std::time::Duration;

use super::entity::{join_ports, short_id};
use super::{Entity, EntityKey, TableId};

/// How long a notification stays on screen.
pub const NOTIFICATION_DURATION: Duration = Duration::from_secs(5);

/// A change detected between two consecutive snapshots of one table.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    /// The key is present now and was absent from the baseline.
    Appeared { table: TableId, entity: Entity },
    /// The key was in the baseline and is gone now. Carries the last-known
    /// entity so the message can name its ports.
    Vanished { table: TableId, entity: Entity },
    /// The entity now holds a watched port it did not hold before.
    WatchedPortActivated {
        table: TableId,
        entity: Entity,
        port: u16,
    },
}

impl ReconcileEvent {
    pub fn table(&self) -> TableId {
        match self {
            ReconcileEvent::Appeared { table, .. }
            | ReconcileEvent::Vanished { table, .. }
            | ReconcileEvent::WatchedPortActivated { table, .. } => *table,
        }
    }

    pub fn entity(&self) -> &Entity {
        match self {
            ReconcileEvent::Appeared { entity, .. }
            | ReconcileEvent::Vanished { entity, .. }
            | ReconcileEvent::WatchedPortActivated { entity, .. } => entity,
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.entity().key
    }

    /// The toast to show for this event, if any.
    ///
    /// Appearances are only announced for processes that already listen on
    /// something; a bare `node` REPL starting is not news.
    pub fn notification(&self) -> Option<Notification> {
        match self {
            ReconcileEvent::Appeared { entity, .. } => match &entity.key {
                EntityKey::Pid(pid) if !entity.ports.is_empty() => Some(Notification::info(
                    format!("New process PID {} on port {}", pid, join_ports(&entity.ports)),
                )),
                _ => None,
            },
            ReconcileEvent::Vanished { entity, .. } => match &entity.key {
                EntityKey::Pid(pid) => {
                    let ports = if entity.ports.is_empty() {
                        String::new()
                    } else {
                        format!(" (port {})", join_ports(&entity.ports))
                    };
                    Some(Notification::warning(format!(
                        "Process PID {}{} exited",
                        pid, ports
                    )))
                }
                EntityKey::Container(id) => Some(Notification::warning(format!(
                    "Docker container {} stopped",
                    short_id(id)
                ))),
            },
            ReconcileEvent::WatchedPortActivated { entity, port, .. } => {
                let owner = match &entity.key {
                    EntityKey::Pid(pid) => format!("PID {}", pid),
                    EntityKey::Container(_) => format!("container {}", entity.name),
                };
                Some(Notification::info(format!(
                    "Watched port {} active ({})",
                    port, owner
                )))
            }
        }
    }
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

/// A transient message for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub duration: Duration,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            duration: NOTIFICATION_DURATION,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Information)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vanished_process_names_ports() {
        let event = ReconcileEvent::Vanished {
            table: TableId::DevProcesses,
            entity: Entity::process(100, "node").with_ports([3000, 3001]),
        };
        let note = event.notification().unwrap();
        assert_eq!(note.message, "Process PID 100 (port 3000, 3001) exited");
        assert_eq!(note.severity, Severity::Warning);
        assert_eq!(note.duration, NOTIFICATION_DURATION);
    }

    #[test]
    fn test_vanished_container_uses_short_id() {
        let event = ReconcileEvent::Vanished {
            table: TableId::Containers,
            entity: Entity::container("0123456789abcdef", "db"),
        };
        assert_eq!(
            event.notification().unwrap().message,
            "Docker container 0123456789ab stopped"
        );
    }

    #[test]
    fn test_appeared_without_ports_is_silent() {
        let event = ReconcileEvent::Appeared {
            table: TableId::DevProcesses,
            entity: Entity::process(5, "node"),
        };
        assert!(event.notification().is_none());

        let event = ReconcileEvent::Appeared {
            table: TableId::DevProcesses,
            entity: Entity::process(5, "node").with_ports([5173]),
        };
        assert_eq!(
            event.notification().unwrap().message,
            "New process PID 5 on port 5173"
        );
    }

    #[test]
    fn test_watched_port_message() {
        let event = ReconcileEvent::WatchedPortActivated {
            table: TableId::DevProcesses,
            entity: Entity::process(100, "node"),
            port: 3000,
        };
        let note = event.notification().unwrap();
        assert_eq!(note.message, "Watched port 3000 active (PID 100)");
        assert_eq!(note.severity, Severity::Information);
    }
}
