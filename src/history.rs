use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::organizer::BatchResult;

/// One finished batch as kept in the run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub run_id: String,
    pub timestamp: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl HistoryRecord {
    pub fn from_result(result: &BatchResult) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            total: result.total,
            successful: result.moved,
            failed: result.failed(),
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}  |  Total: {}  |  OK {}  |  FAILED {}",
            self.timestamp, self.total, self.successful, self.failed
        )
    }
}

/// Append-only JSON-lines log of finished batches.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &HistoryRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(record).map_err(io::Error::other)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    /// Newest first. A missing log is an empty history; unparseable lines
    /// are skipped.
    pub fn load(&self) -> io::Result<Vec<HistoryRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut records = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<HistoryRecord>(line).ok())
            .collect::<Vec<_>>();
        records.reverse();
        Ok(records)
    }
}
