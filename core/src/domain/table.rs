//! Table and polling group identifiers.

use serde::{Deserialize, Serialize};

/// A group of tables sampled together by one poll.
///
/// The poller keeps at most one collection in flight per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PollGroup {
    /// Processes of interest and containers.
    Dev,
    /// Every process plus aggregate system stats.
    System,
}

impl PollGroup {
    pub const ALL: [PollGroup; 2] = [PollGroup::Dev, PollGroup::System];

    /// Tables filled by a poll of this group.
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            PollGroup::Dev => &[TableId::DevProcesses, TableId::Containers],
            PollGroup::System => &[TableId::AllProcesses],
        }
    }
}

/// One rendered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableId {
    /// Processes matching the configured interest patterns.
    DevProcesses,
    /// Running containers.
    Containers,
    /// All processes, heaviest first.
    AllProcesses,
}

impl TableId {
    pub const ALL: [TableId; 3] = [
        TableId::DevProcesses,
        TableId::Containers,
        TableId::AllProcesses,
    ];

    /// Column headers, in the order entity fields are built.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            TableId::DevProcesses => &[
                "PID",
                "Project",
                "Port(s)",
                "Memory",
                "CPU",
                "Uptime",
                "Directory",
                "Command",
            ],
            TableId::Containers => &[
                "ID",
                "Name",
                "Image",
                "Status",
                "Ports",
                "Running For",
                "Compose",
                "Service",
            ],
            TableId::AllProcesses => &[
                "PID", "Name", "CPU %", "Memory", "Mem %", "User", "Status", "Command",
            ],
        }
    }

    /// Section title shown above the table.
    pub fn title(&self) -> &'static str {
        match self {
            TableId::DevProcesses => "Dev Processes",
            TableId::Containers => "Docker Containers",
            TableId::AllProcesses => "All Processes (by memory)",
        }
    }

    /// The poll group that produces this table.
    pub fn group(&self) -> PollGroup {
        match self {
            TableId::DevProcesses | TableId::Containers => PollGroup::Dev,
            TableId::AllProcesses => PollGroup::System,
        }
    }

    /// Whether successive snapshots of this table are diffed into events.
    ///
    /// The all-process table churns on every cycle and is only rendered.
    pub fn is_reconciled(&self) -> bool {
        !matches!(self, TableId::AllProcesses)
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_cover_every_table_once() {
        let mut seen: Vec<TableId> = PollGroup::ALL
            .iter()
            .flat_map(|g| g.tables().iter().copied())
            .collect();
        seen.sort();
        assert_eq!(seen, TableId::ALL.to_vec());
        for table in TableId::ALL {
            assert!(table.group().tables().contains(&table));
        }
    }

    #[test]
    fn test_every_table_has_eight_columns() {
        for table in TableId::ALL {
            assert_eq!(table.columns().len(), 8);
        }
    }

    #[test]
    fn test_only_dev_tables_are_reconciled() {
        assert!(TableId::DevProcesses.is_reconciled());
        assert!(TableId::Containers.is_reconciled());
        assert!(!TableId::AllProcesses.is_reconciled());
    }
}
