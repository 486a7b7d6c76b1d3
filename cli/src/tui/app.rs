//! TUI-local state layered over the dashboard.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use devdash_core::{
    Config, Dashboard, LogTail, MutationPort, Notification, ProcessDetail, SnapshotProvider,
    TableId,
};

/// Toasts shown at once; older ones wait their turn.
pub const MAX_VISIBLE_TOASTS: usize = 3;

/// Log lines kept in the overlay.
const LOG_SCROLLBACK: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// Typing into the filter bar.
    Filter,
    /// Container log overlay is open.
    Logs,
    /// Process detail overlay is open.
    Detail,
}

/// A notification with its expiry. The clock starts once it is shown.
pub struct Toast {
    pub notification: Notification,
    pub expires_at: Option<Instant>,
}

/// Scrollable detail overlay for one process.
pub struct DetailView {
    pub title: String,
    pub lines: Vec<String>,
    pub scroll: usize,
}

impl DetailView {
    pub fn scroll_by(&mut self, delta: isize) {
        let last = self.lines.len().saturating_sub(1);
        self.scroll = self.scroll.saturating_add_signed(delta).min(last);
    }
}

/// Streaming log overlay for one container.
pub struct LogView {
    pub title: String,
    pub lines: VecDeque<String>,
    pub tail: LogTail,
}

pub struct App<H> {
    pub dashboard: Dashboard<H>,
    pub mode: Mode,
    /// Focused header column per table.
    header_focus: HashMap<TableId, usize>,
    pub toasts: VecDeque<Toast>,
    pub logs: Option<LogView>,
    pub detail: Option<DetailView>,
    /// Percent thresholds for warning and critical colouring.
    pub color_threshold_low: f64,
    pub color_threshold_high: f64,
    pub should_quit: bool,
}

impl<H> App<H>
where
    H: SnapshotProvider + MutationPort + 'static,
{
    pub fn new(dashboard: Dashboard<H>, config: &Config) -> Self {
        Self {
            dashboard,
            mode: Mode::Normal,
            header_focus: HashMap::new(),
            toasts: VecDeque::new(),
            logs: None,
            detail: None,
            color_threshold_low: config.color_threshold_low,
            color_threshold_high: config.color_threshold_high,
            should_quit: false,
        }
    }

    pub fn header_focus(&self, table: TableId) -> usize {
        self.header_focus.get(&table).copied().unwrap_or(0)
    }

    /// Move the header focus of the active table, wrapping at either end.
    pub fn move_header_focus(&mut self, delta: isize) {
        let table = self.dashboard.active_table();
        let count = table.columns().len() as isize;
        let current = self.header_focus(table) as isize;
        let next = (current + delta).rem_euclid(count) as usize;
        self.header_focus.insert(table, next);
    }

    /// Sort the active table by its focused header.
    pub fn sort_by_focused_header(&mut self) {
        let table = self.dashboard.active_table();
        let column = self.header_focus(table);
        self.dashboard.views_mut().select_sort_column(table, column);
    }

    pub fn open_logs(&mut self, title: String, tail: LogTail) {
        self.logs = Some(LogView {
            title,
            lines: VecDeque::new(),
            tail,
        });
        self.mode = Mode::Logs;
    }

    pub fn open_detail(&mut self, detail: &ProcessDetail) {
        self.detail = Some(DetailView {
            title: detail.title(),
            lines: detail.lines(),
            scroll: 0,
        });
        self.mode = Mode::Detail;
    }

    pub fn close_detail(&mut self) {
        self.detail = None;
        self.mode = Mode::Normal;
    }

    /// Per-frame housekeeping: pick up new notifications, expire old toasts
    /// and pull streamed log lines.
    pub fn update(&mut self, now: Instant) {
        for notification in self.dashboard.take_notifications() {
            self.toasts.push_back(Toast {
                notification,
                expires_at: None,
            });
        }

        self.toasts
            .retain(|toast| toast.expires_at.map_or(true, |at| at > now));
        for toast in self.toasts.iter_mut().take(MAX_VISIBLE_TOASTS) {
            toast
                .expires_at
                .get_or_insert(now + toast.notification.duration);
        }

        if let Some(logs) = &mut self.logs {
            logs.lines.extend(logs.tail.drain());
            while logs.lines.len() > LOG_SCROLLBACK {
                logs.lines.pop_front();
            }
        }
    }

    pub fn visible_toasts(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter().take(MAX_VISIBLE_TOASTS)
    }
}
