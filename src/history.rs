//! Run history persistence (`state/history.jsonl`).
//!
//! Append-only so past runs stay auditable; one line per run.
use crate::engine::{RunCounts, RunReport, RunStatus};
use crate::paths::StatePaths;
use crate::util::append_jsonl;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Current schema version for history entries.
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HistoryEntry {
    pub schema_version: u32,
    pub started_at_epoch_ms: u128,
    pub finished_at_epoch_ms: u128,
    pub scope: String,
    pub status: RunStatus,
    pub counts: RunCounts,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automated_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
}

impl HistoryEntry {
    pub fn from_report(
        report: &RunReport,
        source_revision: Option<&str>,
        automated_coverage: Option<f64>,
    ) -> Self {
        Self {
            schema_version: HISTORY_SCHEMA_VERSION,
            started_at_epoch_ms: report.started_at_epoch_ms,
            finished_at_epoch_ms: report.finished_at_epoch_ms,
            scope: report.scope.clone(),
            status: report.status,
            counts: report.counts.clone(),
            cancelled: report.cancelled,
            source_revision: source_revision.map(str::to_string),
            automated_coverage,
            snapshot_path: report.snapshot_path.clone(),
        }
    }
}

pub fn append_history(paths: &StatePaths, entry: &HistoryEntry) -> Result<()> {
    append_jsonl(&paths.history_path(), entry)
}

/// Most recent `limit` entries, oldest first. Unparseable lines are skipped.
pub fn read_recent(paths: &StatePaths, limit: usize) -> Result<Vec<HistoryEntry>> {
    let path = paths.history_path();
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let mut entries: Vec<HistoryEntry> = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => tracing::warn!(line = index + 1, "skipping history entry: {err}"),
        }
    }
    let skip = entries.len().saturating_sub(limit);
    Ok(entries.split_off(skip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(started: u128) -> HistoryEntry {
        HistoryEntry {
            schema_version: HISTORY_SCHEMA_VERSION,
            started_at_epoch_ms: started,
            finished_at_epoch_ms: started + 5,
            scope: "all".to_string(),
            status: RunStatus::Passed,
            counts: RunCounts::default(),
            cancelled: false,
            source_revision: None,
            automated_coverage: Some(70.0),
            snapshot_path: None,
        }
    }

    #[test]
    fn appends_and_reads_back_most_recent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path().to_path_buf());
        assert!(read_recent(&paths, 5).expect("empty").is_empty());

        for started in [1, 2, 3] {
            append_history(&paths, &entry(started)).expect("append");
        }
        fs::OpenOptions::new()
            .append(true)
            .open(paths.history_path())
            .and_then(|mut file| std::io::Write::write_all(&mut file, b"not json\n"))
            .expect("append garbage");

        let recent = read_recent(&paths, 2).expect("read");
        assert_eq!(
            recent
                .iter()
                .map(|entry| entry.started_at_epoch_ms)
                .collect::<Vec<_>>(),
            vec![2, 3]
        );
    }
}
