//! List command - show dev processes and containers once.

use anyhow::Result;
use devdash_core::application::collect;
use devdash_core::{Availability, Config, LocalHost, PollGroup, Snapshot};

/// Widest a column is allowed to grow in plain-text output.
const MAX_COLUMN_WIDTH: usize = 40;

pub async fn run(config: &Config, json: bool) -> Result<()> {
    let host = LocalHost::new(config.interest_patterns.clone());
    let cycle = collect(&host, PollGroup::Dev, config.process_limit).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&cycle.snapshots)?);
        return Ok(());
    }

    for (i, snapshot) in cycle.snapshots.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_snapshot(snapshot);
    }
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    let table = snapshot.table();
    println!("{} ({})", table.title(), snapshot.len());

    if let Availability::Unavailable(reason) = snapshot.availability() {
        println!("  no data: {}", reason);
        return;
    }
    if snapshot.is_empty() {
        println!("  none");
        return;
    }

    let columns = table.columns();
    let rows: Vec<Vec<String>> = snapshot
        .entities()
        .iter()
        .map(|e| e.cells().map(|c| truncate(c, MAX_COLUMN_WIDTH)).collect())
        .collect();
    let widths = column_widths(columns, &rows);

    println!("{}", format_row(columns.iter().map(|c| c.to_string()), &widths));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len()));
    for row in rows {
        println!("{}", format_row(row.into_iter(), &widths));
    }
}

fn column_widths(columns: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect()
}

fn format_row(cells: impl Iterator<Item = String>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max - 1).collect();
        format!("{}…", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
        assert_eq!(truncate("ééééé", 5), "ééééé");
    }

    #[test]
    fn test_column_widths_cover_header_and_cells() {
        let rows = vec![vec!["12345".to_string(), "a".to_string()]];
        assert_eq!(column_widths(&["PID", "Name"], &rows), vec![5, 4]);
        assert_eq!(
            format_row(["1".to_string(), "x".to_string()].into_iter(), &[3, 2]),
            "1    x"
        );
    }
}
