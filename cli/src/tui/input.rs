//! Key handling.
//!
//! Keys mutate the app synchronously. Work that has to await (export, log
//! streams) is returned as an [`Effect`] for the event loop to run.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use devdash_core::{MutationPort, PollGroup, SnapshotProvider, TableId};

use super::app::{App, Mode};

/// Rows skipped by PageUp/PageDown.
const PAGE: isize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Export,
    /// Start streaming logs of the container with this id and name.
    OpenLogs { id: String, name: String },
    /// Inspect the process with this pid.
    OpenDetail { pid: u32 },
    CloseLogs,
}

pub fn handle_key<H>(app: &mut App<H>, key: KeyEvent) -> Effect
where
    H: SnapshotProvider + MutationPort + 'static,
{
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return Effect::None;
    }

    // A pending confirmation swallows every other key.
    if app.dashboard.pending_confirmation().is_some() {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                app.dashboard.resolve_confirmation(true)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.dashboard.resolve_confirmation(false)
            }
            _ => {}
        }
        return Effect::None;
    }

    match app.mode {
        Mode::Filter => handle_filter_key(app, key),
        Mode::Logs => match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('l') => Effect::CloseLogs,
            _ => Effect::None,
        },
        Mode::Detail => {
            let lines = match key.code {
                KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('d') => {
                    app.close_detail();
                    return Effect::None;
                }
                KeyCode::Char('j') | KeyCode::Down => 1,
                KeyCode::Char('k') | KeyCode::Up => -1,
                KeyCode::PageDown => PAGE,
                KeyCode::PageUp => -PAGE,
                _ => 0,
            };
            if let Some(detail) = &mut app.detail {
                detail.scroll_by(lines);
            }
            Effect::None
        }
        Mode::Normal => handle_normal_key(app, key),
    }
}

fn handle_filter_key<H>(app: &mut App<H>, key: KeyEvent) -> Effect
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let views = app.dashboard.views_mut();
    match key.code {
        KeyCode::Esc => {
            views.clear_filter();
            app.mode = Mode::Normal;
        }
        KeyCode::Enter => app.mode = Mode::Normal,
        KeyCode::Backspace => {
            let mut text = views.filter().to_string();
            text.pop();
            views.set_filter(text);
        }
        KeyCode::Char(c) => {
            let text = format!("{}{}", views.filter(), c);
            views.set_filter(text);
        }
        _ => {}
    }
    Effect::None
}

fn handle_normal_key<H>(app: &mut App<H>, key: KeyEvent) -> Effect
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let table = app.dashboard.active_table();

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('r') => {
            app.dashboard.refresh();
            app.dashboard.set_status("Refreshing...");
        }
        KeyCode::Char('k') | KeyCode::Delete => {
            if let Err(rejected) = app.dashboard.request_action() {
                app.dashboard.set_status(rejected.to_string());
            }
        }
        KeyCode::Char(' ') => {
            app.dashboard.views_mut().toggle_selection(table);
        }
        KeyCode::Char('c') => app.dashboard.views_mut().clear_selection(),
        KeyCode::Char('/') => app.mode = Mode::Filter,
        KeyCode::Esc => app.dashboard.views_mut().clear_filter(),
        KeyCode::Tab => app.dashboard.focus_next_table(),
        KeyCode::Char('1') => app.dashboard.select_group(PollGroup::Dev),
        KeyCode::Char('2') => app.dashboard.select_group(PollGroup::System),
        KeyCode::Left => app.move_header_focus(-1),
        KeyCode::Right => app.move_header_focus(1),
        KeyCode::Char('s') => app.sort_by_focused_header(),
        KeyCode::Char('j') | KeyCode::Down => app.dashboard.views_mut().move_cursor(table, 1),
        KeyCode::Up => app.dashboard.views_mut().move_cursor(table, -1),
        KeyCode::PageDown => app.dashboard.views_mut().move_cursor(table, PAGE),
        KeyCode::PageUp => app.dashboard.views_mut().move_cursor(table, -PAGE),
        KeyCode::Char('g') | KeyCode::Home => app.dashboard.views_mut().cursor_home(table),
        KeyCode::Char('G') | KeyCode::End => app.dashboard.views_mut().cursor_end(table),
        KeyCode::Char('l') => return open_logs(app, table),
        KeyCode::Char('d') => return open_detail(app, table),
        KeyCode::Char('e') => return Effect::Export,
        _ => {}
    }
    Effect::None
}

fn open_logs<H>(app: &mut App<H>, table: TableId) -> Effect
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let container = (table == TableId::Containers)
        .then(|| app.dashboard.views().row_at_cursor(table))
        .flatten()
        .and_then(|entity| Some((entity.key.container_id()?.to_string(), entity.name.clone())));

    match container {
        Some((id, name)) => Effect::OpenLogs { id, name },
        None => {
            app.dashboard
                .set_status("Select a container to view its logs");
            Effect::None
        }
    }
}

fn open_detail<H>(app: &mut App<H>, table: TableId) -> Effect
where
    H: SnapshotProvider + MutationPort + 'static,
{
    match app
        .dashboard
        .views()
        .row_at_cursor(table)
        .and_then(|entity| entity.key.pid())
    {
        Some(pid) => Effect::OpenDetail { pid },
        None => {
            app.dashboard.set_status("Select a process to inspect");
            Effect::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::{
        AggregateStats, Config, Dashboard, DashboardOptions, Entity, ProcessDetail, Result,
    };
    use std::sync::Arc;

    struct FixedHost;

    impl SnapshotProvider for FixedHost {
        async fn list_processes_of_interest(&self) -> Result<Vec<Entity>> {
            Ok(vec![
                Entity::process(20, "node").field("PID", "20").field("Memory", "10 MB"),
                Entity::process(10, "node").field("PID", "10").field("Memory", "50 MB"),
            ])
        }

        async fn list_containers(&self) -> Result<Vec<Entity>> {
            Ok(vec![Entity::container("abc123", "db").field("ID", "abc123")])
        }

        async fn list_all_processes(&self, _limit: usize) -> Result<Vec<Entity>> {
            Ok(vec![Entity::process(1, "init").field("PID", "1")])
        }

        async fn aggregate_stats(&self) -> Result<AggregateStats> {
            Ok(AggregateStats::default())
        }
    }

    impl MutationPort for FixedHost {
        async fn terminate_process(&self, _pid: u32) -> Result<bool> {
            Ok(true)
        }

        async fn stop_container(&self, _id: &str) -> Result<bool> {
            Ok(true)
        }
    }

    async fn app() -> App<FixedHost> {
        let config = Config::default();
        let mut dashboard =
            Dashboard::start(Arc::new(FixedHost), DashboardOptions::from(&config)).unwrap();
        while TableId::ALL
            .iter()
            .any(|t| dashboard.views().latest(*t).is_none())
        {
            let message = dashboard.recv().await.unwrap();
            dashboard.handle(message);
        }
        App::new(dashboard, &config)
    }

    fn press(app: &mut App<FixedHost>, code: KeyCode) -> Effect {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[tokio::test]
    async fn test_filter_typing_and_escape() {
        let mut app = app().await;
        press(&mut app, KeyCode::Char('/'));
        assert_eq!(app.mode, Mode::Filter);

        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('0'));
        assert_eq!(app.dashboard.views().filter(), "20");
        assert_eq!(app.dashboard.render(TableId::DevProcesses).visible(), 1);

        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.dashboard.views().filter(), "2");

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, Mode::Normal);
        assert_eq!(app.dashboard.views().filter(), "");
    }

    #[tokio::test]
    async fn test_confirmation_swallows_keys() {
        let mut app = app().await;
        press(&mut app, KeyCode::Char('k'));
        assert!(app.dashboard.pending_confirmation().is_some());

        // 'q' does not quit while the dialog is open.
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit);

        press(&mut app, KeyCode::Char('n'));
        assert!(app.dashboard.pending_confirmation().is_none());
        assert!(!app.dashboard.is_action_running());
    }

    #[tokio::test]
    async fn test_sort_by_focused_header() {
        let mut app = app().await;
        // PID, Project, Port(s), Memory
        for _ in 0..3 {
            press(&mut app, KeyCode::Right);
        }
        assert_eq!(app.header_focus(TableId::DevProcesses), 3);

        press(&mut app, KeyCode::Char('s'));
        let rows = app.dashboard.render(TableId::DevProcesses).rows;
        assert_eq!(rows[0].cells[0], "20");

        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.header_focus(TableId::DevProcesses), 7);
    }

    #[tokio::test]
    async fn test_tabs_and_logs() {
        let mut app = app().await;
        assert_eq!(press(&mut app, KeyCode::Char('l')), Effect::None);
        assert_eq!(
            app.dashboard.status(),
            Some("Select a container to view its logs")
        );

        press(&mut app, KeyCode::Tab);
        assert_eq!(
            press(&mut app, KeyCode::Char('l')),
            Effect::OpenLogs {
                id: "abc123".into(),
                name: "db".into()
            }
        );

        press(&mut app, KeyCode::Char('2'));
        assert_eq!(app.dashboard.active_table(), TableId::AllProcesses);
        assert_eq!(press(&mut app, KeyCode::Char('e')), Effect::Export);
    }

    #[tokio::test]
    async fn test_detail_opens_for_processes_only() {
        let mut app = app().await;
        let pid = app
            .dashboard
            .views()
            .row_at_cursor(TableId::DevProcesses)
            .and_then(|entity| entity.key.pid())
            .unwrap();
        assert_eq!(press(&mut app, KeyCode::Char('d')), Effect::OpenDetail { pid });

        press(&mut app, KeyCode::Tab);
        assert_eq!(press(&mut app, KeyCode::Char('d')), Effect::None);
        assert_eq!(app.dashboard.status(), Some("Select a process to inspect"));
    }

    #[tokio::test]
    async fn test_detail_overlay_scrolls_and_closes() {
        let mut app = app().await;
        let detail = ProcessDetail {
            pid: 10,
            name: "node".into(),
            status: "running".into(),
            user: None,
            cwd: None,
            cpu_percent: 0.0,
            rss_bytes: 0,
            virtual_bytes: 0,
            threads: Some(4),
            command: "node".into(),
            ports: vec![],
            children: vec![],
            environment: vec![],
        };
        app.open_detail(&detail);
        assert_eq!(app.mode, Mode::Detail);

        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Up);
        assert_eq!(app.detail.as_ref().unwrap().scroll, 1);

        // 'k' scrolls here instead of requesting a kill.
        press(&mut app, KeyCode::Char('k'));
        assert!(app.dashboard.pending_confirmation().is_none());

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, Mode::Normal);
        assert!(app.detail.is_none());
    }

    #[tokio::test]
    async fn test_selection_and_quit() {
        let mut app = app().await;
        press(&mut app, KeyCode::Char(' '));
        assert!(app.dashboard.views().has_selection());
        press(&mut app, KeyCode::Char('c'));
        assert!(!app.dashboard.views().has_selection());

        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }
}
