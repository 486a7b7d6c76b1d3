//! View state management.
//!
//! Every table is rendered as `latest snapshot → filter → sort → selection
//! marks`. The transforms live here and survive every refresh; only the
//! snapshot underneath them changes.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::{Availability, Entity, EntityKey, Snapshot, TableId};

/// Prefix marking a selected row's first cell.
pub const SELECTION_MARK: &str = "* ";

// ============================================================================
// Sorting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    /// Header glyph.
    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    }
}

/// Active sort of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub column: usize,
    pub direction: SortDirection,
}

/// Comparable form of a cell's display text.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    /// Trim, drop one trailing `%`, then read a leading `[0-9.]+` run as a
    /// number. Anything else sorts as lowercased text.
    fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed);
        let numeric_len = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());

        if numeric_len > 0 {
            if let Ok(n) = trimmed[..numeric_len].parse::<f64>() {
                return SortKey::Number(n);
            }
        }
        SortKey::Text(trimmed.to_lowercase())
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    /// Numbers order before text.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
        }
    }
}

// ============================================================================
// View state
// ============================================================================

/// Per-table transforms.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub sort: Option<SortSpec>,
    /// May hold keys absent from the latest snapshot; they render nothing.
    pub selection: HashSet<EntityKey>,
    /// Positional index into the visible rows.
    pub cursor: usize,
}

/// One row ready for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    pub key: EntityKey,
    pub cells: Vec<String>,
    pub selected: bool,
}

/// A table ready for drawing.
#[derive(Debug, Clone)]
pub struct RenderedTable {
    pub table: TableId,
    pub columns: &'static [&'static str],
    pub rows: Vec<RenderedRow>,
    /// Entities in the snapshot before filtering.
    pub total: usize,
    /// Cursor row, `None` when nothing is visible.
    pub cursor: Option<usize>,
    pub sort: Option<SortSpec>,
    /// `None` until the first poll of the table completes.
    pub availability: Option<Availability>,
    pub selected: usize,
}

impl RenderedTable {
    pub fn visible(&self) -> usize {
        self.rows.len()
    }

    /// `Dev Processes (3/12)` or `Dev Processes (12)`.
    pub fn header(&self) -> String {
        if self.visible() == self.total {
            format!("{} ({})", self.table.title(), self.total)
        } else {
            format!("{} ({}/{})", self.table.title(), self.visible(), self.total)
        }
    }
}

/// Owns the latest snapshot of every table plus the user's transforms.
#[derive(Debug, Default)]
pub struct ViewManager {
    filter: String,
    filter_lower: String,
    views: HashMap<TableId, ViewState>,
    latest: HashMap<TableId, Snapshot>,
}

impl ViewManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a table's snapshot. Sort, filter and selection are kept; the
    /// cursor is clamped to the new row count.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        let table = snapshot.table();
        self.latest.insert(table, snapshot);
        self.clamp_cursor(table);
    }

    pub fn latest(&self, table: TableId) -> Option<&Snapshot> {
        self.latest.get(&table)
    }

    pub fn view(&self, table: TableId) -> Option<&ViewState> {
        self.views.get(&table)
    }

    fn view_mut(&mut self, table: TableId) -> &mut ViewState {
        self.views.entry(table).or_default()
    }

    // ------------------------------------------------------------------------
    // Filter
    // ------------------------------------------------------------------------

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Set the filter shared by all tables.
    pub fn set_filter(&mut self, text: impl Into<String>) {
        self.filter = text.into();
        self.filter_lower = self.filter.to_lowercase();
        for table in TableId::ALL {
            self.clamp_cursor(table);
        }
    }

    pub fn clear_filter(&mut self) {
        self.set_filter(String::new());
    }

    // ------------------------------------------------------------------------
    // Sort
    // ------------------------------------------------------------------------

    pub fn sort(&self, table: TableId) -> Option<SortSpec> {
        self.views.get(&table).and_then(|v| v.sort)
    }

    /// Sort by `column`; choosing the current sort column again flips the
    /// direction. The cursor stays on the row it was on.
    pub fn select_sort_column(&mut self, table: TableId, column: usize) {
        if column >= table.columns().len() {
            return;
        }
        let focused = self.row_at_cursor(table).map(|e| e.key.clone());

        let view = self.view_mut(table);
        view.sort = Some(match view.sort {
            Some(current) if current.column == column => SortSpec {
                column,
                direction: current.direction.toggled(),
            },
            _ => SortSpec {
                column,
                direction: SortDirection::Ascending,
            },
        });

        let index = focused.and_then(|key| {
            self.visible_rows(table)
                .iter()
                .position(|e| e.key == key)
        });
        if let Some(index) = index {
            self.view_mut(table).cursor = index;
        }
    }

    // ------------------------------------------------------------------------
    // Rows and cursor
    // ------------------------------------------------------------------------

    /// Filtered and sorted rows of the latest snapshot.
    pub fn visible_rows(&self, table: TableId) -> Vec<&Entity> {
        let Some(snapshot) = self.latest.get(&table) else {
            return Vec::new();
        };

        let mut rows: Vec<&Entity> = snapshot
            .entities()
            .iter()
            .filter(|e| e.matches_filter(&self.filter_lower))
            .collect();

        if let Some(sort) = self.sort(table) {
            let mut keyed: Vec<(SortKey, &Entity)> = rows
                .into_iter()
                .map(|e| (SortKey::parse(e.cell(sort.column).unwrap_or_default()), e))
                .collect();
            // `sort_by` is stable, and reversing the comparison (not the
            // result) keeps equal keys in snapshot order both ways.
            keyed.sort_by(|a, b| match sort.direction {
                SortDirection::Ascending => a.0.cmp(&b.0),
                SortDirection::Descending => b.0.cmp(&a.0),
            });
            rows = keyed.into_iter().map(|(_, e)| e).collect();
        }

        rows
    }

    pub fn cursor(&self, table: TableId) -> usize {
        self.views.get(&table).map_or(0, |v| v.cursor)
    }

    /// The entity under the cursor.
    pub fn row_at_cursor(&self, table: TableId) -> Option<&Entity> {
        self.visible_rows(table).get(self.cursor(table)).copied()
    }

    /// Move the cursor by `delta` rows, stopping at either end.
    pub fn move_cursor(&mut self, table: TableId, delta: isize) {
        let rows = self.visible_rows(table).len();
        if rows == 0 {
            return;
        }
        let cursor = self.cursor(table).min(rows - 1);
        let target = cursor.saturating_add_signed(delta).min(rows - 1);
        self.view_mut(table).cursor = target;
    }

    pub fn cursor_home(&mut self, table: TableId) {
        self.view_mut(table).cursor = 0;
    }

    pub fn cursor_end(&mut self, table: TableId) {
        let rows = self.visible_rows(table).len();
        if rows > 0 {
            self.view_mut(table).cursor = rows - 1;
        }
    }

    /// `min(cursor, rows - 1)`; an empty table leaves the cursor alone.
    fn clamp_cursor(&mut self, table: TableId) {
        let rows = self.visible_rows(table).len();
        if rows == 0 {
            return;
        }
        let view = self.view_mut(table);
        view.cursor = view.cursor.min(rows - 1);
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Flip selection of the row under the cursor. Returns the new state, or
    /// `None` when there is no row.
    pub fn toggle_selection(&mut self, table: TableId) -> Option<bool> {
        let key = self.row_at_cursor(table)?.key.clone();
        let selection = &mut self.view_mut(table).selection;
        if selection.remove(&key) {
            Some(false)
        } else {
            selection.insert(key);
            Some(true)
        }
    }

    pub fn is_selected(&self, table: TableId, key: &EntityKey) -> bool {
        self.views
            .get(&table)
            .is_some_and(|v| v.selection.contains(key))
    }

    /// Selected keys of one table, including stale ones.
    pub fn selection(&self, table: TableId) -> impl Iterator<Item = &EntityKey> {
        self.views
            .get(&table)
            .into_iter()
            .flat_map(|v| v.selection.iter())
    }

    /// Whether any table has a selection.
    pub fn has_selection(&self) -> bool {
        self.views.values().any(|v| !v.selection.is_empty())
    }

    /// Empty every table's selection.
    pub fn clear_selection(&mut self) {
        for view in self.views.values_mut() {
            view.selection.clear();
        }
    }

    // ------------------------------------------------------------------------
    // Render
    // ------------------------------------------------------------------------

    pub fn render(&self, table: TableId) -> RenderedTable {
        let rows: Vec<RenderedRow> = self
            .visible_rows(table)
            .into_iter()
            .map(|entity| {
                let selected = self.is_selected(table, &entity.key);
                let mut cells: Vec<String> = entity.cells().map(str::to_string).collect();
                if selected {
                    if let Some(first) = cells.first_mut() {
                        first.insert_str(0, SELECTION_MARK);
                    }
                }
                RenderedRow {
                    key: entity.key.clone(),
                    cells,
                    selected,
                }
            })
            .collect();

        let snapshot = self.latest.get(&table);
        let cursor = if rows.is_empty() {
            None
        } else {
            Some(self.cursor(table).min(rows.len() - 1))
        };
        let selected = rows.iter().filter(|r| r.selected).count();

        RenderedTable {
            table,
            columns: table.columns(),
            total: snapshot.map_or(0, Snapshot::len),
            cursor,
            sort: self.sort(table),
            availability: snapshot.map(|s| s.availability().clone()),
            selected,
            rows,
        }
    }
}
