//! Kill/stop coordination.
//!
//! An action moves through `Idle → AwaitingConfirmation → Executing → Idle`
//! (or back to `Idle` when cancelled). Confirmation is plain data: the UI
//! reads [`ActionCoordinator::pending`] and answers with
//! [`ActionCoordinator::resolve`]. Execution runs on a worker that only
//! reports through the hand-off channel.

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{short_id, Entity, EntityKey, TableId};
use crate::ports::MutationPort;

use super::poller::CoreMessage;
use super::view::ViewManager;

/// Why an action request was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionRejected {
    /// Another action is awaiting confirmation or running.
    #[error("Another action is still in progress")]
    Busy,

    /// Nothing under the cursor and no live selected rows.
    #[error("Nothing to act on")]
    NoTargets,
}

/// Whether the action came from the selection sets or the cursor row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionMode {
    Single,
    Batch,
}

/// One entity an action applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    Process { pid: u32, name: String },
    Container { id: String, name: String },
}

impl ActionTarget {
    fn from_entity(entity: &Entity) -> Self {
        match &entity.key {
            EntityKey::Pid(pid) => ActionTarget::Process {
                pid: *pid,
                name: entity.name.clone(),
            },
            EntityKey::Container(id) => ActionTarget::Container {
                id: id.clone(),
                name: entity.name.clone(),
            },
        }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            ActionTarget::Process { pid, .. } => EntityKey::Pid(*pid),
            ActionTarget::Container { id, .. } => EntityKey::Container(id.clone()),
        }
    }

    /// `PID 42` or `'web'`.
    pub fn label(&self) -> String {
        match self {
            ActionTarget::Process { pid, .. } => format!("PID {}", pid),
            ActionTarget::Container { name, .. } => format!("'{}'", name),
        }
    }

    fn progress(&self, mode: ActionMode, source: TableId) -> String {
        match (self, mode) {
            (ActionTarget::Process { pid, name }, ActionMode::Single)
                if source == TableId::AllProcesses =>
            {
                format!("Killing '{}' (PID {})...", name, pid)
            }
            (ActionTarget::Process { pid, .. }, _) => format!("Killing PID {}...", pid),
            (ActionTarget::Container { name, .. }, ActionMode::Single) => {
                format!("Stopping '{}'...", name)
            }
            (ActionTarget::Container { id, .. }, ActionMode::Batch) => {
                format!("Stopping container {}...", short_id(id))
            }
        }
    }
}

/// An action awaiting the user's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub id: Uuid,
    pub mode: ActionMode,
    /// Table that was active when the action was requested.
    pub source: TableId,
    pub targets: Vec<ActionTarget>,
    /// Question to show in the confirmation dialog.
    pub prompt: String,
}

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    Idle,
    AwaitingConfirmation(PendingAction),
    Executing { id: Uuid, mode: ActionMode },
}

/// Per-target outcomes of one finished action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub id: Uuid,
    pub mode: ActionMode,
    pub source: TableId,
    pub outcomes: Vec<(ActionTarget, bool)>,
}

impl ActionReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|(_, ok)| *ok)
    }

    /// Status line describing the outcome.
    pub fn summary(&self) -> String {
        match self.mode {
            ActionMode::Single => match self.outcomes.first() {
                Some((ActionTarget::Process { name, .. }, ok))
                    if self.source == TableId::AllProcesses =>
                {
                    if *ok {
                        format!("Killed '{}'", name)
                    } else {
                        format!("Failed to kill '{}'", name)
                    }
                }
                Some((ActionTarget::Process { pid, .. }, ok)) => {
                    if *ok {
                        format!("Killed PID {}", pid)
                    } else {
                        format!("Failed to kill PID {}", pid)
                    }
                }
                Some((ActionTarget::Container { name, .. }, ok)) => {
                    if *ok {
                        format!("Stopped '{}'", name)
                    } else {
                        format!("Failed to stop '{}'", name)
                    }
                }
                None => "Nothing to do".to_string(),
            },
            ActionMode::Batch => {
                let killed = self
                    .outcomes
                    .iter()
                    .filter(|(t, ok)| *ok && matches!(t, ActionTarget::Process { .. }))
                    .count();
                let stopped = self
                    .outcomes
                    .iter()
                    .filter(|(t, ok)| *ok && matches!(t, ActionTarget::Container { .. }))
                    .count();
                let mut summary = format!(
                    "Killed {} process(es), stopped {} container(s)",
                    killed, stopped
                );
                let failed: Vec<String> = self
                    .outcomes
                    .iter()
                    .filter(|(_, ok)| !*ok)
                    .map(|(t, _)| t.label())
                    .collect();
                if !failed.is_empty() {
                    summary.push_str(&format!("; failed: {}", failed.join(", ")));
                }
                summary
            }
        }
    }
}

/// The kill/stop state machine.
#[derive(Debug, Default)]
pub struct ActionCoordinator {
    state: ActionState,
}

impl ActionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ActionState::Idle
    }

    /// The action awaiting confirmation, if any.
    pub fn pending(&self) -> Option<&PendingAction> {
        match &self.state {
            ActionState::AwaitingConfirmation(pending) => Some(pending),
            _ => None,
        }
    }

    /// Resolve targets and move to `AwaitingConfirmation`.
    ///
    /// With any selection present, targets are the union of every table's
    /// selected keys that still exist in the latest snapshots, each key once.
    /// Otherwise the target is the cursor row of `active`.
    pub fn request(
        &mut self,
        views: &ViewManager,
        active: TableId,
    ) -> Result<&PendingAction, ActionRejected> {
        if !self.is_idle() {
            return Err(ActionRejected::Busy);
        }

        let pending = Self::resolve_targets(views, active)?;
        self.state = ActionState::AwaitingConfirmation(pending);
        self.pending().ok_or(ActionRejected::NoTargets)
    }

    fn resolve_targets(
        views: &ViewManager,
        active: TableId,
    ) -> Result<PendingAction, ActionRejected> {
        let pending = if views.has_selection() {
            let targets = selected_targets(views);
            if targets.is_empty() {
                return Err(ActionRejected::NoTargets);
            }
            PendingAction {
                id: Uuid::new_v4(),
                mode: ActionMode::Batch,
                source: active,
                prompt: batch_prompt(&targets),
                targets,
            }
        } else {
            let entity = views
                .row_at_cursor(active)
                .ok_or(ActionRejected::NoTargets)?;
            PendingAction {
                id: Uuid::new_v4(),
                mode: ActionMode::Single,
                source: active,
                prompt: single_prompt(active, entity),
                targets: vec![ActionTarget::from_entity(entity)],
            }
        };
        Ok(pending)
    }

    /// Answer the pending confirmation. Returns the action to execute when
    /// confirmed; a cancel silently returns to `Idle`.
    pub fn resolve(&mut self, confirmed: bool) -> Option<PendingAction> {
        let ActionState::AwaitingConfirmation(pending) = std::mem::take(&mut self.state) else {
            return None;
        };
        if !confirmed {
            return None;
        }
        self.state = ActionState::Executing {
            id: pending.id,
            mode: pending.mode,
        };
        Some(pending)
    }

    /// Record a finished action. Only the action that is executing can
    /// return the machine to `Idle`; stale reports are ignored.
    pub fn finish(&mut self, report: &ActionReport) -> bool {
        match self.state {
            ActionState::Executing { id, .. } if id == report.id => {
                self.state = ActionState::Idle;
                true
            }
            _ => false,
        }
    }
}

fn selected_targets(views: &ViewManager) -> Vec<ActionTarget> {
    let mut seen: HashSet<EntityKey> = HashSet::new();
    let mut targets = Vec::new();

    for table in TableId::ALL {
        let Some(snapshot) = views.latest(table) else {
            continue;
        };
        let mut keys: Vec<&EntityKey> = views.selection(table).collect();
        keys.sort();
        for key in keys {
            if seen.contains(key) {
                continue;
            }
            // Stale keys have no entity and are dropped here.
            if let Some(entity) = snapshot.get(key) {
                seen.insert(key.clone());
                targets.push(ActionTarget::from_entity(entity));
            }
        }
    }

    // Processes first, then containers.
    targets.sort_by_key(|t| matches!(t, ActionTarget::Container { .. }));
    targets
}

fn single_prompt(table: TableId, entity: &Entity) -> String {
    match (&entity.key, table) {
        (EntityKey::Container(_), _) => format!(
            "Stop container '{}' ({})?",
            entity.name,
            entity.get("Image").unwrap_or("unknown image")
        ),
        (EntityKey::Pid(pid), TableId::AllProcesses) => format!(
            "Kill process '{}' (PID {}, {})?",
            entity.name,
            pid,
            entity.get("Memory").unwrap_or("-")
        ),
        (EntityKey::Pid(pid), _) => {
            if entity.ports.is_empty() {
                format!("Kill process PID {}?", pid)
            } else {
                format!("Kill process PID {} (port {})?", pid, entity.ports_label())
            }
        }
    }
}

fn batch_prompt(targets: &[ActionTarget]) -> String {
    let processes = targets
        .iter()
        .filter(|t| matches!(t, ActionTarget::Process { .. }))
        .count();
    let containers = targets.len() - processes;

    let mut items = Vec::new();
    if processes > 0 {
        items.push(format!("{} process(es)", processes));
    }
    if containers > 0 {
        items.push(format!("{} container(s)", containers));
    }
    format!("Kill/stop {}?", items.join(", "))
}

/// Run a confirmed action against `port`, reporting progress and the final
/// report through `tx`. Targets run one after another.
pub async fn execute<M: MutationPort>(
    port: &M,
    action: PendingAction,
    tx: UnboundedSender<CoreMessage>,
) {
    let mut outcomes = Vec::with_capacity(action.targets.len());

    for target in action.targets {
        let _ = tx.send(CoreMessage::ActionProgress {
            action: action.id,
            message: target.progress(action.mode, action.source),
        });

        let result = match &target {
            ActionTarget::Process { pid, .. } => port.terminate_process(*pid).await,
            ActionTarget::Container { id, .. } => port.stop_container(id).await,
        };
        let ok = match result {
            Ok(ok) => ok,
            Err(e) => {
                warn!(target = %target.label(), error = %e, "Action failed");
                false
            }
        };
        info!(target = %target.label(), ok, "Action target finished");
        outcomes.push((target, ok));
    }

    let _ = tx.send(CoreMessage::ActionFinished(ActionReport {
        id: action.id,
        mode: action.mode,
        source: action.source,
        outcomes,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use crate::error::{Error, Result};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingPort {
        calls: Mutex<Vec<String>>,
        failing: Vec<EntityKey>,
    }

    impl MutationPort for RecordingPort {
        async fn terminate_process(&self, pid: u32) -> Result<bool> {
            self.calls.lock().push(format!("kill {}", pid));
            if self.failing.contains(&EntityKey::Pid(pid)) {
                return Err(Error::PermissionDenied(format!("PID {}", pid)));
            }
            Ok(true)
        }

        async fn stop_container(&self, id: &str) -> Result<bool> {
            self.calls.lock().push(format!("stop {}", id));
            Ok(!self.failing.contains(&EntityKey::Container(id.to_string())))
        }
    }

    fn views() -> ViewManager {
        let mut views = ViewManager::new();
        views.apply_snapshot(Snapshot::live(
            TableId::DevProcesses,
            vec![
                Entity::process(10, "node").with_ports([3000]).field("PID", "10"),
                Entity::process(11, "node").field("PID", "11"),
            ],
        ));
        views.apply_snapshot(Snapshot::live(
            TableId::Containers,
            vec![Entity::container("c0ffee00000000", "db")
                .field("ID", "c0ffee000000")
                .field("Name", "db")
                .field("Image", "postgres:16")],
        ));
        views.apply_snapshot(Snapshot::live(
            TableId::AllProcesses,
            vec![
                Entity::process(10, "node").field("PID", "10").field("Memory", "80 MB"),
                Entity::process(1, "init").field("PID", "1").field("Memory", "12 MB"),
            ],
        ));
        views
    }

    #[test]
    fn test_single_mode_targets_cursor_row() {
        let views = views();
        let mut actions = ActionCoordinator::new();

        let pending = actions.request(&views, TableId::DevProcesses).unwrap();
        assert_eq!(pending.mode, ActionMode::Single);
        assert_eq!(pending.prompt, "Kill process PID 10 (port 3000)?");
        assert_eq!(pending.targets, vec![ActionTarget::Process { pid: 10, name: "node".into() }]);
    }

    #[test]
    fn test_single_prompts_per_table() {
        let views = views();

        let mut actions = ActionCoordinator::new();
        let pending = actions.request(&views, TableId::Containers).unwrap();
        assert_eq!(pending.prompt, "Stop container 'db' (postgres:16)?");

        let mut actions = ActionCoordinator::new();
        let pending = actions.request(&views, TableId::AllProcesses).unwrap();
        assert_eq!(pending.prompt, "Kill process 'node' (PID 10, 80 MB)?");
    }

    #[test]
    fn test_requests_while_not_idle_are_busy() {
        let views = views();
        let mut actions = ActionCoordinator::new();
        actions.request(&views, TableId::DevProcesses).unwrap();
        assert_eq!(
            actions.request(&views, TableId::DevProcesses).unwrap_err(),
            ActionRejected::Busy
        );

        actions.resolve(true).unwrap();
        assert_eq!(
            actions.request(&views, TableId::DevProcesses).unwrap_err(),
            ActionRejected::Busy
        );
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let views = views();
        let mut actions = ActionCoordinator::new();
        actions.request(&views, TableId::DevProcesses).unwrap();
        assert!(actions.resolve(false).is_none());
        assert!(actions.is_idle());
        assert!(actions.resolve(true).is_none());
    }

    #[test]
    fn test_only_matching_report_finishes() {
        let views = views();
        let mut actions = ActionCoordinator::new();
        actions.request(&views, TableId::DevProcesses).unwrap();
        let action = actions.resolve(true).unwrap();

        let stale = ActionReport {
            id: Uuid::new_v4(),
            mode: ActionMode::Single,
            source: TableId::DevProcesses,
            outcomes: vec![],
        };
        assert!(!actions.finish(&stale));
        assert!(!actions.is_idle());

        let report = ActionReport {
            id: action.id,
            mode: action.mode,
            source: action.source,
            outcomes: vec![],
        };
        assert!(actions.finish(&report));
        assert!(actions.is_idle());
    }

    #[test]
    fn test_batch_unions_tables_and_drops_stale_keys() {
        let mut views = views();
        // PID 10 selected in two tables, plus a container.
        views.toggle_selection(TableId::DevProcesses);
        views.toggle_selection(TableId::AllProcesses);
        views.toggle_selection(TableId::Containers);
        // PID 11 selected, then it exits.
        views.move_cursor(TableId::DevProcesses, 1);
        views.toggle_selection(TableId::DevProcesses);
        views.apply_snapshot(Snapshot::live(
            TableId::DevProcesses,
            vec![Entity::process(10, "node").with_ports([3000]).field("PID", "10")],
        ));

        let mut actions = ActionCoordinator::new();
        let pending = actions.request(&views, TableId::DevProcesses).unwrap();
        assert_eq!(pending.mode, ActionMode::Batch);
        assert_eq!(pending.prompt, "Kill/stop 1 process(es), 1 container(s)?");
        assert_eq!(
            pending.targets.iter().map(ActionTarget::key).collect::<Vec<_>>(),
            vec![EntityKey::Pid(10), EntityKey::Container("c0ffee00000000".into())]
        );
    }

    #[test]
    fn test_batch_with_only_stale_keys_is_rejected() {
        let mut views = views();
        views.toggle_selection(TableId::Containers);
        views.apply_snapshot(Snapshot::live(TableId::Containers, vec![]));

        let mut actions = ActionCoordinator::new();
        assert_eq!(
            actions.request(&views, TableId::DevProcesses).unwrap_err(),
            ActionRejected::NoTargets
        );
        assert!(actions.is_idle());
    }

    #[test]
    fn test_batch_summary() {
        let report = ActionReport {
            id: Uuid::new_v4(),
            mode: ActionMode::Batch,
            source: TableId::DevProcesses,
            outcomes: vec![
                (ActionTarget::Process { pid: 1, name: "a".into() }, true),
                (ActionTarget::Process { pid: 2, name: "b".into() }, false),
                (ActionTarget::Container { id: "x".into(), name: "db".into() }, true),
            ],
        };
        assert_eq!(
            report.summary(),
            "Killed 1 process(es), stopped 1 container(s); failed: PID 2"
        );
        assert!(!report.all_succeeded());
    }

    #[test]
    fn test_single_summaries() {
        let single = |source, target, ok| ActionReport {
            id: Uuid::new_v4(),
            mode: ActionMode::Single,
            source,
            outcomes: vec![(target, ok)],
        };
        let node = || ActionTarget::Process { pid: 5, name: "node".into() };
        assert_eq!(
            single(TableId::DevProcesses, node(), true).summary(),
            "Killed PID 5"
        );
        assert_eq!(
            single(TableId::AllProcesses, node(), true).summary(),
            "Killed 'node'"
        );
        assert_eq!(
            single(TableId::AllProcesses, node(), false).summary(),
            "Failed to kill 'node'"
        );
        let web = ActionTarget::Container { id: "i".into(), name: "web".into() };
        assert_eq!(
            single(TableId::Containers, web, false).summary(),
            "Failed to stop 'web'"
        );
    }

    #[tokio::test]
    async fn test_single_kill_from_all_processes_names_the_process() {
        let views = views();
        let mut actions = ActionCoordinator::new();
        actions.request(&views, TableId::AllProcesses).unwrap();
        let action = actions.resolve(true).unwrap();
        assert_eq!(action.source, TableId::AllProcesses);

        let port = RecordingPort::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        execute(&port, action, tx).await;

        let Ok(CoreMessage::ActionProgress { message, .. }) = rx.try_recv() else {
            panic!("expected a progress message first");
        };
        assert_eq!(message, "Killing 'node' (PID 10)...");
        let Ok(CoreMessage::ActionFinished(report)) = rx.try_recv() else {
            panic!("expected the final report");
        };
        assert_eq!(report.summary(), "Killed 'node'");
    }

    #[tokio::test]
    async fn test_execute_reports_progress_then_outcomes() {
        let port = RecordingPort {
            failing: vec![EntityKey::Pid(2)],
            ..Default::default()
        };
        let action = PendingAction {
            id: Uuid::new_v4(),
            mode: ActionMode::Batch,
            source: TableId::DevProcesses,
            targets: vec![
                ActionTarget::Process { pid: 2, name: "b".into() },
                ActionTarget::Container { id: "abcdef0123456789".into(), name: "db".into() },
            ],
            prompt: String::new(),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        execute(&port, action.clone(), tx).await;

        let mut progress = Vec::new();
        let mut report = None;
        while let Ok(message) = rx.try_recv() {
            match message {
                CoreMessage::ActionProgress { message, .. } => progress.push(message),
                CoreMessage::ActionFinished(r) => report = Some(r),
                CoreMessage::Polled(_) => unreachable!(),
            }
        }

        assert_eq!(
            progress,
            vec!["Killing PID 2...", "Stopping container abcdef012345..."]
        );
        let report = report.unwrap();
        assert_eq!(report.id, action.id);
        assert_eq!(
            report.outcomes.iter().map(|(_, ok)| *ok).collect::<Vec<_>>(),
            vec![false, true]
        );
        assert_eq!(*port.calls.lock(), vec!["kill 2", "stop abcdef0123456789"]);
    }
}
