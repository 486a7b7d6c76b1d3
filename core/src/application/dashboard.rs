//! The dashboard state record.
//!
//! [`Dashboard`] owns every piece of mutable engine state and is driven by a
//! single loop: the caller ticks it, awaits [`Dashboard::recv`] and feeds the
//! result back into [`Dashboard::handle`]. Workers spawned by the dashboard
//! never touch it directly.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::config::Config;
use crate::domain::{AggregateStats, Notification, PollGroup, TableId, WatchSet};
use crate::error::{Error, Result};
use crate::ports::{MutationPort, SnapshotProvider};

use super::actions::{self, ActionCoordinator, ActionMode, ActionRejected, ActionReport, PendingAction};
use super::export::{default_export_dir, write_export, ExportDocument};
use super::poller::{CoreMessage, PollCycle, Poller};
use super::reconciler::Reconciler;
use super::view::{RenderedTable, ViewManager};

/// Notifications kept for the renderer before the oldest are dropped.
const MAX_PENDING_NOTIFICATIONS: usize = 32;

/// Settings the dashboard is started with.
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub refresh_interval: Duration,
    pub process_limit: usize,
    pub watched: WatchSet,
    /// Where `export` writes; defaults to the user data directory.
    pub export_dir: Option<PathBuf>,
}

impl From<&Config> for DashboardOptions {
    fn from(config: &Config) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            process_limit: config.process_limit,
            watched: config.watch_set(),
            export_dir: None,
        }
    }
}

/// Live dashboard state.
pub struct Dashboard<H> {
    host: Arc<H>,
    poller: Poller<H>,
    reconciler: Reconciler,
    views: ViewManager,
    actions: ActionCoordinator,
    tx: UnboundedSender<CoreMessage>,
    rx: UnboundedReceiver<CoreMessage>,
    stats: Option<AggregateStats>,
    notifications: VecDeque<Notification>,
    status: Option<String>,
    active: TableId,
    last_update: Option<DateTime<Utc>>,
    refresh_interval: Duration,
    export_dir: Option<PathBuf>,
}

impl<H> Dashboard<H>
where
    H: SnapshotProvider + MutationPort + 'static,
{
    /// Wire up the hand-off channel and start the first poll of every group.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(host: Arc<H>, options: DashboardOptions) -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Startup(format!("no async runtime available: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut poller = Poller::new(Arc::clone(&host), tx.clone(), options.process_limit);
        poller.request_refresh();

        info!(
            interval_ms = options.refresh_interval.as_millis() as u64,
            watched = %options.watched,
            "Dashboard started"
        );

        Ok(Self {
            host,
            poller,
            reconciler: Reconciler::new(options.watched),
            views: ViewManager::new(),
            actions: ActionCoordinator::new(),
            tx,
            rx,
            stats: None,
            notifications: VecDeque::new(),
            status: None,
            active: TableId::DevProcesses,
            last_update: None,
            refresh_interval: options.refresh_interval,
            export_dir: options.export_dir,
        })
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    // ------------------------------------------------------------------------
    // Core loop
    // ------------------------------------------------------------------------

    /// Regular poll cadence.
    pub fn tick(&mut self) {
        self.poller.tick();
    }

    /// Out-of-cycle poll of every group.
    pub fn refresh(&mut self) {
        self.poller.request_refresh();
    }

    /// Wait for the next worker message.
    pub async fn recv(&mut self) -> Option<CoreMessage> {
        self.rx.recv().await
    }

    /// Handle every message already queued. Returns how many were handled.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    pub fn handle(&mut self, message: CoreMessage) {
        match message {
            CoreMessage::Polled(cycle) => self.apply(cycle),
            CoreMessage::ActionProgress { action, message } => {
                if matches!(self.actions.state(), actions::ActionState::Executing { id, .. } if *id == action)
                {
                    self.status = Some(message);
                }
            }
            CoreMessage::ActionFinished(report) => self.finish_action(report),
        }
    }

    /// Apply one poll cycle: reconcile, queue notifications, then swap in the
    /// new snapshots. The renderer only ever sees whole cycles.
    fn apply(&mut self, cycle: PollCycle) {
        for snapshot in cycle.snapshots {
            for event in self.reconciler.reconcile(&snapshot) {
                if let Some(notification) = event.notification() {
                    self.push_notification(notification);
                }
            }
            self.views.apply_snapshot(snapshot);
        }
        if let Some(stats) = cycle.stats {
            self.stats = Some(stats);
        }
        self.last_update = Some(cycle.completed_at);

        if self.poller.complete(cycle.group) {
            debug!(group = ?cycle.group, "Queued refresh started");
        }
    }

    fn finish_action(&mut self, report: ActionReport) {
        if !self.actions.finish(&report) {
            debug!(action = %report.id, "Ignoring report of a stale action");
            return;
        }

        let summary = report.summary();
        info!(action = %report.id, %summary, "Action finished");
        if !report.all_succeeded() {
            self.push_notification(Notification::error(summary.clone()));
        }
        if report.mode == ActionMode::Batch {
            self.views.clear_selection();
        }
        self.status = Some(summary);
        self.poller.request_refresh();
    }

    fn push_notification(&mut self, notification: Notification) {
        if self.notifications.len() == MAX_PENDING_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        self.notifications.push_back(notification);
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Ask to kill/stop the selection, or the cursor row of the active table.
    pub fn request_action(&mut self) -> std::result::Result<&PendingAction, ActionRejected> {
        self.actions.request(&self.views, self.active)
    }

    pub fn pending_confirmation(&self) -> Option<&PendingAction> {
        self.actions.pending()
    }

    pub fn is_action_running(&self) -> bool {
        matches!(self.actions.state(), actions::ActionState::Executing { .. })
    }

    /// Answer the pending confirmation. A confirmed action starts on a worker.
    pub fn resolve_confirmation(&mut self, confirmed: bool) {
        let Some(action) = self.actions.resolve(confirmed) else {
            return;
        };
        info!(action = %action.id, targets = action.targets.len(), "Action confirmed");

        let host = Arc::clone(&self.host);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            actions::execute(host.as_ref(), action, tx).await;
        });
    }

    // ------------------------------------------------------------------------
    // Renderer access
    // ------------------------------------------------------------------------

    pub fn render(&self, table: TableId) -> RenderedTable {
        self.views.render(table)
    }

    pub fn views(&self) -> &ViewManager {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut ViewManager {
        &mut self.views
    }

    pub fn stats(&self) -> Option<&AggregateStats> {
        self.stats.as_ref()
    }

    pub fn watched(&self) -> &WatchSet {
        self.reconciler.watched()
    }

    /// Pending notifications, oldest first. Empties the queue.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// `3 dev processes | 2 containers | CPU 12% | ... | 14:02:11`
    pub fn summary_line(&self) -> String {
        let count = |table| self.views.latest(table).map_or(0, |s| s.len());
        let mut parts = vec![
            format!("{} dev processes", count(TableId::DevProcesses)),
            format!("{} containers", count(TableId::Containers)),
        ];
        if let Some(stats) = &self.stats {
            parts.push(stats.summary());
        }
        if let Some(at) = self.last_update {
            parts.push(at.with_timezone(&Local).format("%H:%M:%S").to_string());
        }
        parts.join(" | ")
    }

    pub fn active_table(&self) -> TableId {
        self.active
    }

    pub fn set_active_table(&mut self, table: TableId) {
        self.active = table;
    }

    /// Focus the first table of `group`.
    pub fn select_group(&mut self, group: PollGroup) {
        if self.active.group() != group {
            self.active = group.tables()[0];
        }
    }

    /// Move focus to the next table shown alongside the active one.
    pub fn focus_next_table(&mut self) {
        let tables = self.active.group().tables();
        let index = tables.iter().position(|t| *t == self.active).unwrap_or(0);
        self.active = tables[(index + 1) % tables.len()];
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Write the latest snapshots and stats as JSON. Returns the file path.
    pub async fn export(&self) -> Result<PathBuf> {
        let dir = match &self.export_dir {
            Some(dir) => dir.clone(),
            None => default_export_dir()?,
        };
        let document = ExportDocument::new(
            TableId::ALL.iter().filter_map(|t| self.views.latest(*t)),
            self.stats.as_ref(),
        );
        write_export(&dir, &document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::poller::tests::MockProvider;
    use crate::domain::{Entity, EntityKey, Severity};

    impl MutationPort for MockProvider {
        async fn terminate_process(&self, pid: u32) -> Result<bool> {
            let mut processes = self.processes.lock();
            let before = processes.len();
            processes.retain(|e| e.key != EntityKey::Pid(pid));
            Ok(processes.len() != before)
        }

        async fn stop_container(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn options(watched: &[u16]) -> DashboardOptions {
        DashboardOptions {
            refresh_interval: Duration::from_secs(3),
            process_limit: 10,
            watched: watched.iter().copied().collect(),
            export_dir: None,
        }
    }

    fn node(pid: u32, ports: &[u16]) -> Entity {
        Entity::process(pid, "node")
            .with_ports(ports.iter().copied())
            .field("PID", pid.to_string())
    }

    /// Handle messages until no poll is in flight and no action is running.
    async fn settle(dashboard: &mut Dashboard<MockProvider>) {
        while PollGroup::ALL.iter().any(|g| dashboard.poller.is_in_flight(*g))
            || dashboard.is_action_running()
        {
            let message = dashboard.recv().await.unwrap();
            dashboard.handle(message);
        }
    }

    fn messages(notifications: &[Notification]) -> Vec<&str> {
        notifications.iter().map(|n| n.message.as_str()).collect()
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let host = Arc::new(MockProvider::default());
        let result = Dashboard::start(host, options(&[]));
        assert!(matches!(result, Err(Error::Startup(_))));
    }

    #[tokio::test]
    async fn test_watched_port_then_exit() {
        let host = Arc::new(MockProvider::default());
        *host.processes.lock() = vec![node(100, &[])];
        let mut dashboard = Dashboard::start(Arc::clone(&host), options(&[3000])).unwrap();
        settle(&mut dashboard).await;
        assert!(dashboard.take_notifications().is_empty());
        assert_eq!(dashboard.views().latest(TableId::DevProcesses).unwrap().len(), 1);

        *host.processes.lock() = vec![node(100, &[3000])];
        dashboard.refresh();
        settle(&mut dashboard).await;
        let notes = dashboard.take_notifications();
        assert_eq!(messages(&notes), vec!["Watched port 3000 active (PID 100)"]);
        assert_eq!(notes[0].severity, Severity::Information);

        host.processes.lock().clear();
        dashboard.refresh();
        settle(&mut dashboard).await;
        assert_eq!(
            messages(&dashboard.take_notifications()),
            vec!["Process PID 100 (port 3000) exited"]
        );
    }

    #[tokio::test]
    async fn test_unavailable_containers_render_without_events() {
        let host = Arc::new(MockProvider::default());
        *host.containers.lock() = Some(vec![Entity::container("abc", "db")]);
        let mut dashboard = Dashboard::start(Arc::clone(&host), options(&[])).unwrap();
        settle(&mut dashboard).await;

        *host.containers.lock() = None;
        dashboard.refresh();
        settle(&mut dashboard).await;

        assert!(dashboard.take_notifications().is_empty());
        let rendered = dashboard.render(TableId::Containers);
        assert_eq!(rendered.visible(), 0);
        assert!(matches!(
            rendered.availability,
            Some(crate::domain::Availability::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_confirmed_kill_refreshes() {
        let host = Arc::new(MockProvider::default());
        *host.processes.lock() = vec![node(1, &[]), node(2, &[])];
        let mut dashboard = Dashboard::start(Arc::clone(&host), options(&[])).unwrap();
        settle(&mut dashboard).await;

        let prompt = dashboard.request_action().unwrap().prompt.clone();
        assert_eq!(prompt, "Kill process PID 1?");
        assert!(dashboard.pending_confirmation().is_some());

        dashboard.resolve_confirmation(true);
        // Waits for the completion and the refresh it requests.
        settle(&mut dashboard).await;

        assert_eq!(dashboard.status(), Some("Killed PID 1"));
        let keys: Vec<_> = dashboard
            .views()
            .latest(TableId::DevProcesses)
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec![EntityKey::Pid(2)]);
        assert_eq!(
            messages(&dashboard.take_notifications()),
            vec!["Process PID 1 exited"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_action_is_silent() {
        let host = Arc::new(MockProvider::default());
        *host.processes.lock() = vec![node(1, &[])];
        let mut dashboard = Dashboard::start(Arc::clone(&host), options(&[])).unwrap();
        settle(&mut dashboard).await;

        dashboard.request_action().unwrap();
        dashboard.resolve_confirmation(false);
        assert!(dashboard.pending_confirmation().is_none());
        assert!(!dashboard.is_action_running());
        assert_eq!(dashboard.status(), None);
        assert_eq!(host.processes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_failure_notifies_and_clears_selection() {
        let host = Arc::new(MockProvider::default());
        *host.processes.lock() = vec![node(1, &[])];
        *host.containers.lock() = Some(vec![Entity::container("abc", "db").field("ID", "abc")]);
        let mut dashboard = Dashboard::start(Arc::clone(&host), options(&[])).unwrap();
        settle(&mut dashboard).await;

        dashboard.views_mut().toggle_selection(TableId::DevProcesses);
        dashboard.views_mut().toggle_selection(TableId::Containers);
        dashboard.request_action().unwrap();
        dashboard.resolve_confirmation(true);
        settle(&mut dashboard).await;

        let expected = "Killed 1 process(es), stopped 0 container(s); failed: 'db'";
        assert_eq!(dashboard.status(), Some(expected));
        assert!(!dashboard.views().has_selection());
        let notes = dashboard.take_notifications();
        assert!(notes
            .iter()
            .any(|n| n.severity == Severity::Error && n.message == expected));
    }

    #[tokio::test]
    async fn test_focus_and_groups() {
        let host = Arc::new(MockProvider::default());
        let mut dashboard = Dashboard::start(host, options(&[])).unwrap();

        assert_eq!(dashboard.active_table(), TableId::DevProcesses);
        dashboard.focus_next_table();
        assert_eq!(dashboard.active_table(), TableId::Containers);
        dashboard.focus_next_table();
        assert_eq!(dashboard.active_table(), TableId::DevProcesses);

        dashboard.select_group(PollGroup::System);
        assert_eq!(dashboard.active_table(), TableId::AllProcesses);
        dashboard.focus_next_table();
        assert_eq!(dashboard.active_table(), TableId::AllProcesses);
    }

    #[tokio::test]
    async fn test_export_uses_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(MockProvider::default());
        *host.processes.lock() = vec![node(5, &[])];
        let mut options = options(&[]);
        options.export_dir = Some(dir.path().to_path_buf());
        let mut dashboard = Dashboard::start(host, options).unwrap();
        settle(&mut dashboard).await;

        let path = dashboard.export().await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["dev_processes"][0]["PID"], "5");
        assert_eq!(value["all_processes"][0]["PID"], "5");
        assert_eq!(value["system_stats"]["cpu_count"], 8);
    }
}
