//! JSON snapshot export.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::domain::{AggregateStats, Entity, Snapshot, TableId};
use crate::error::{Error, Result};

/// Everything shown on screen at one instant. Written out, never read back.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub timestamp: String,
    pub dev_processes: Vec<Map<String, Value>>,
    pub docker_containers: Vec<Map<String, Value>>,
    pub all_processes: Vec<Map<String, Value>>,
    pub system_stats: Option<AggregateStats>,
    #[serde(skip)]
    taken_at: DateTime<Local>,
}

impl ExportDocument {
    /// Build a document from the latest snapshot of each table. Missing
    /// tables export as empty lists.
    pub fn new<'a>(
        snapshots: impl IntoIterator<Item = &'a Snapshot>,
        stats: Option<&AggregateStats>,
    ) -> Self {
        let taken_at = Local::now();
        let mut document = Self {
            timestamp: taken_at.to_rfc3339(),
            dev_processes: Vec::new(),
            docker_containers: Vec::new(),
            all_processes: Vec::new(),
            system_stats: stats.cloned(),
            taken_at,
        };

        for snapshot in snapshots {
            let rows = snapshot.entities().iter().map(field_map).collect();
            match snapshot.table() {
                TableId::DevProcesses => document.dev_processes = rows,
                TableId::Containers => document.docker_containers = rows,
                TableId::AllProcesses => document.all_processes = rows,
            }
        }
        document
    }

    /// `snapshot-YYYYmmdd-HHMMSS.json`, or `snapshot-YYYYmmdd-HHMMSS-N.json`
    /// for the `N`th extra export within the same second.
    pub fn file_name(&self, attempt: usize) -> String {
        let stamp = self.taken_at.format("%Y%m%d-%H%M%S");
        match attempt {
            0 => format!("snapshot-{}.json", stamp),
            n => format!("snapshot-{}-{}.json", stamp, n),
        }
    }
}

fn field_map(entity: &Entity) -> Map<String, Value> {
    entity
        .fields
        .iter()
        .map(|f| (f.name.clone(), Value::String(f.value.clone())))
        .collect()
}

/// `<data_local_dir>/devdash`
pub fn default_export_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join("devdash"))
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))
}

/// Files tried before giving up on a free name.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Write `document` into `dir`, creating it if needed. Never overwrites an
/// earlier export. Returns the file path.
pub async fn write_export(dir: &Path, document: &ExportDocument) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let content = serde_json::to_string_pretty(document)?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(document.file_name(attempt));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        info!(path = %path.display(), "Exported snapshot");
        return Ok(path);
    }

    Err(Error::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free export file name in {}", dir.display()),
    )))
}
