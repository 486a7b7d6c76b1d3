//! TUI rendering.

use devdash_core::application::RenderedTable;
use devdash_core::{
    AggregateStats, Availability, MutationPort, PollGroup, Severity, SnapshotProvider, TableId,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
};

use super::app::{App, Mode};

/// Widest a column is allowed to grow before the text is cut.
const MAX_COLUMN_WIDTH: u16 = 40;

/// Columns whose values are percentages coloured by threshold.
const PERCENT_COLUMNS: &[&str] = &["CPU", "CPU %", "Mem %"];

pub fn draw<H>(f: &mut Frame, app: &App<H>)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Stats
            Constraint::Length(1), // Tabs
            Constraint::Min(0),    // Tables
            Constraint::Length(1), // Filter
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    draw_stats(f, app, chunks[0]);
    draw_tabs(f, app, chunks[1]);
    draw_tables(f, app, chunks[2]);
    draw_filter(f, app, chunks[3]);
    draw_status(f, app, chunks[4]);

    draw_toasts(f, app);
    match app.mode {
        Mode::Logs => draw_logs(f, app),
        Mode::Detail => draw_detail(f, app),
        _ => {}
    }
    if let Some(pending) = app.dashboard.pending_confirmation() {
        draw_confirm(f, &pending.prompt);
    }
}

fn threshold_color<H>(app: &App<H>, percent: f64) -> Color {
    if percent >= app.color_threshold_high {
        Color::Red
    } else if percent >= app.color_threshold_low {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn draw_stats<H>(f: &mut Frame, app: &App<H>, area: Rect)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let line = match app.dashboard.stats() {
        Some(stats) => stats_line(app, stats),
        None => Line::from("Collecting system stats...").style(Style::default().fg(Color::DarkGray)),
    };

    let stats = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" devdash ")
            .title_style(Style::default().fg(Color::Cyan).bold()),
    );
    f.render_widget(stats, area);
}

fn stats_line<'a, H>(app: &App<H>, stats: &'a AggregateStats) -> Line<'a> {
    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::DarkGray));
    let value = |text: String, percent: f64| {
        Span::styled(text, Style::default().fg(threshold_color(app, percent)).bold())
    };

    Line::from(vec![
        label("CPU "),
        value(
            format!("{:.1}% ({} cores)", stats.cpu_percent, stats.cpu_count),
            stats.cpu_percent,
        ),
        label("  Mem "),
        value(
            format!(
                "{:.1}/{:.1}GB {:.1}%",
                stats.memory_used_gb, stats.memory_total_gb, stats.memory_percent
            ),
            stats.memory_percent,
        ),
        label("  Swap "),
        value(format!("{:.1}%", stats.swap_percent), stats.swap_percent),
        label("  Disk "),
        value(
            format!("{:.0}GB free {:.1}%", stats.disk_free_gb, stats.disk_percent),
            stats.disk_percent,
        ),
        label("  Net "),
        Span::raw(stats.network_label()),
    ])
}

fn draw_tabs<H>(f: &mut Frame, app: &App<H>, area: Rect)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let selected = match app.dashboard.active_table().group() {
        PollGroup::Dev => 0,
        PollGroup::System => 1,
    };
    let tabs = Tabs::new(vec!["1 Dev", "2 System"])
        .select(selected)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(Style::default().fg(Color::Cyan).bold());
    f.render_widget(tabs, area);
}

fn draw_tables<H>(f: &mut Frame, app: &App<H>, area: Rect)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let tables = app.dashboard.active_table().group().tables();
    let constraints: Vec<Constraint> = match tables.len() {
        2 => vec![Constraint::Percentage(60), Constraint::Percentage(40)],
        n => vec![Constraint::Ratio(1, n as u32); n],
    };
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    for (table, area) in tables.iter().zip(areas.iter()) {
        draw_table(f, app, *table, *area);
    }
}

fn draw_table<H>(f: &mut Frame, app: &App<H>, table: TableId, area: Rect)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let rendered = app.dashboard.render(table);
    let active = app.dashboard.active_table() == table;
    let focus = app.header_focus(table);

    let border = if active { Color::Cyan } else { Color::DarkGray };
    let mut title = format!(" {} ", rendered.header());
    if rendered.selected > 0 {
        title.push_str(&format!("{} selected ", rendered.selected));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title);

    if let Some(Availability::Unavailable(reason)) = &rendered.availability {
        let text = Paragraph::new(format!("no data: {}", reason))
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true })
            .block(block);
        f.render_widget(text, area);
        return;
    }

    let header_cells = rendered.columns.iter().enumerate().map(|(i, name)| {
        let mut text = name.to_string();
        if let Some(sort) = rendered.sort.filter(|s| s.column == i) {
            text.push(' ');
            text.push_str(sort.direction.arrow());
        }
        let mut style = Style::default().fg(Color::Yellow).bold();
        if active && i == focus {
            style = style.add_modifier(Modifier::REVERSED);
        }
        Cell::from(text).style(style)
    });
    let header = Row::new(header_cells).height(1);

    let rows = rendered.rows.iter().map(|row| {
        let cells = row.cells.iter().enumerate().map(|(i, value)| {
            let cell = Cell::from(value.as_str());
            match percent_value(&rendered, i, value) {
                Some(percent) => cell.style(Style::default().fg(threshold_color(app, percent))),
                None => cell,
            }
        });
        let style = if row.selected {
            Style::default().fg(Color::Magenta)
        } else {
            Style::default()
        };
        Row::new(cells).style(style)
    });

    let widths = column_widths(&rendered);
    let highlight = if active {
        Style::default().bg(Color::DarkGray).fg(Color::White)
    } else {
        Style::default()
    };
    let widget = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(highlight);

    let mut state = TableState::default();
    state.select(rendered.cursor);
    f.render_stateful_widget(widget, area, &mut state);
}

fn percent_value(rendered: &RenderedTable, column: usize, value: &str) -> Option<f64> {
    let name = rendered.columns.get(column)?;
    if !PERCENT_COLUMNS.contains(name) {
        return None;
    }
    value.trim().trim_end_matches('%').parse().ok()
}

fn column_widths(rendered: &RenderedTable) -> Vec<Constraint> {
    let last = rendered.columns.len().saturating_sub(1);
    rendered
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i == last {
                return Constraint::Min(10);
            }
            let widest = rendered
                .rows
                .iter()
                .filter_map(|r| r.cells.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(name.chars().count() + 2))
                .max()
                .unwrap_or(0);
            Constraint::Length((widest as u16).min(MAX_COLUMN_WIDTH))
        })
        .collect()
}

fn draw_filter<H>(f: &mut Frame, app: &App<H>, area: Rect)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let filter = app.dashboard.views().filter();
    let line = match app.mode {
        Mode::Filter => Line::from(vec![
            Span::styled("Filter: ", Style::default().fg(Color::Cyan).bold()),
            Span::raw(format!("{}_", filter)),
        ]),
        _ if !filter.is_empty() => Line::from(vec![
            Span::styled("Filter: ", Style::default().fg(Color::DarkGray)),
            Span::raw(filter.to_string()),
            Span::styled("  (esc to clear)", Style::default().fg(Color::DarkGray)),
        ]),
        _ => Line::from(""),
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_status<H>(f: &mut Frame, app: &App<H>, area: Rect)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let help = match app.mode {
        Mode::Filter => "Type to filter | Enter: done | Esc: clear",
        Mode::Logs => "Esc/l: close logs",
        Mode::Detail => "j/k scroll | Esc/d: close details",
        Mode::Normal => {
            "q quit | r refresh | k kill/stop | space select | / filter | tab table | ←→ s sort | d details | l logs | e export"
        }
    };

    let mut spans = Vec::new();
    if let Some(status) = app.dashboard.status() {
        spans.push(Span::styled(status.to_string(), Style::default().fg(Color::White).bold()));
        spans.push(Span::raw(" | "));
    }
    spans.push(Span::raw(app.dashboard.summary_line()));
    spans.push(Span::raw(" | "));
    spans.push(Span::styled(help, Style::default().fg(Color::DarkGray)));

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_toasts<H>(f: &mut Frame, app: &App<H>)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let area = f.area();
    let width = (area.width / 2).max(30).min(area.width);
    let mut y = area.y + 1;

    for toast in app.visible_toasts() {
        if y + 3 > area.bottom() {
            break;
        }
        let color = match toast.notification.severity {
            Severity::Information => Color::Cyan,
            Severity::Warning => Color::Yellow,
            Severity::Error => Color::Red,
        };
        let rect = Rect::new(area.right().saturating_sub(width + 1), y, width, 3);
        let widget = Paragraph::new(toast.notification.message.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        );
        f.render_widget(Clear, rect);
        f.render_widget(widget, rect);
        y += 3;
    }
}

fn draw_confirm(f: &mut Frame, prompt: &str) {
    let rect = centered_rect(60, 7, f.area());
    let text = vec![
        Line::from(prompt.to_string()).bold(),
        Line::from(""),
        Line::from(vec![
            Span::styled("[y] ", Style::default().fg(Color::Green).bold()),
            Span::raw("Yes   "),
            Span::styled("[n] ", Style::default().fg(Color::Red).bold()),
            Span::raw("No"),
        ]),
    ];
    let dialog = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Confirm "),
        );
    f.render_widget(Clear, rect);
    f.render_widget(dialog, rect);
}

fn draw_logs<H>(f: &mut Frame, app: &App<H>)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let Some(logs) = &app.logs else {
        return;
    };
    let area = f.area();
    let rect = centered_rect(area.width.saturating_sub(4), area.height.saturating_sub(4), area);
    let height = rect.height.saturating_sub(2) as usize;
    let skip = logs.lines.len().saturating_sub(height);
    let lines: Vec<Line> = logs
        .lines
        .iter()
        .skip(skip)
        .map(|l| Line::from(l.as_str()))
        .collect();

    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" Logs: {} ", logs.title)),
    );
    f.render_widget(Clear, rect);
    f.render_widget(widget, rect);
}

fn draw_detail<H>(f: &mut Frame, app: &App<H>)
where
    H: SnapshotProvider + MutationPort + 'static,
{
    let Some(detail) = &app.detail else {
        return;
    };
    let area = f.area();
    let rect = centered_rect(area.width * 9 / 10, area.height * 4 / 5, area);
    let lines: Vec<Line> = detail
        .lines
        .iter()
        .skip(detail.scroll)
        .map(|l| Line::from(l.as_str()))
        .collect();

    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" Process Details: {} ", detail.title)),
    );
    f.render_widget(Clear, rect);
    f.render_widget(widget, rect);
}

/// A `width` x `height` rectangle centred in `area`, clipped to fit.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}
