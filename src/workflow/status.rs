//! Workflow status step.
//!
//! Status is read-only: recorded item state, pending checkpoints and recent runs.
use super::Workspace;
use crate::cli::StatusArgs;
use crate::clock::{Clock, SystemClock};
use crate::history::{read_recent, HistoryEntry};
use crate::output::{percent, print_json, print_table};
use crate::registry::{Category, LastResult, Registry};
use crate::scenario::{Checkpoint, FileCheckpointStore};
use anyhow::Result;
use serde::Serialize;

const RECENT_RUNS: usize = 5;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct StatusRow {
    pub item_id: String,
    pub title: String,
    pub category: Category,
    pub automatable: bool,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<LastResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at_epoch_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_detail: Option<String>,
    /// Reason of an active ignore mark.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub items: Vec<StatusRow>,
    /// Interrupted scenarios the next run resumes.
    pub checkpoints: Vec<Checkpoint>,
    pub recent_runs: Vec<HistoryEntry>,
}

pub fn status_rows(
    registry: &Registry,
    category: Option<Category>,
    now_epoch_ms: u128,
) -> Vec<StatusRow> {
    registry
        .entries()
        .filter(|entry| category.is_none_or(|category| entry.category() == category))
        .map(|entry| {
            let state = registry.state(&entry.id);
            StatusRow {
                item_id: entry.id.clone(),
                title: entry.item.title.clone(),
                category: entry.category(),
                automatable: entry.item.automatable,
                verified: state.verified,
                last_result: state.last_result,
                last_run_at_epoch_ms: state.last_run_at_epoch_ms,
                ignored: state
                    .active_ignore(now_epoch_ms)
                    .map(|mark| mark.reason.clone()),
                last_detail: state.last_detail,
            }
        })
        .collect()
}

pub fn run_status(workspace: &Workspace, args: &StatusArgs, json: bool) -> Result<()> {
    let registry = workspace.load_registry()?;
    let now = SystemClock.now_epoch_ms()?;
    let summary = StatusSummary {
        items: status_rows(&registry, args.category, now),
        checkpoints: FileCheckpointStore::new(workspace.paths.checkpoints_dir()).list()?,
        recent_runs: read_recent(&workspace.paths, RECENT_RUNS)?,
    };
    if json {
        return print_json(&summary);
    }

    let rows: Vec<Vec<String>> = summary
        .items
        .iter()
        .map(|row| {
            let state = match (&row.ignored, row.verified) {
                (Some(_), _) => "ignored",
                (None, true) => "verified",
                (None, false) => "unverified",
            };
            vec![
                row.item_id.clone(),
                row.category.to_string(),
                state.to_string(),
                row.last_result
                    .map(|result| result.to_string())
                    .unwrap_or_default(),
                row.ignored
                    .clone()
                    .or_else(|| row.last_detail.clone())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ITEM", "CATEGORY", "STATE", "LAST RESULT", "NOTE"], &rows);

    for checkpoint in &summary.checkpoints {
        println!(
            "resumable: {} for {} at step {}",
            checkpoint.scenario_id,
            checkpoint.item_id,
            checkpoint.step_index + 1
        );
    }
    if !summary.recent_runs.is_empty() {
        println!();
        for run in &summary.recent_runs {
            println!(
                "run {} {}: {} (automated {})",
                run.started_at_epoch_ms,
                run.scope,
                run.status,
                percent(run.automated_coverage)
            );
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
