//! Run report: one outcome per item plus the aggregate status.
use crate::outcome::{Outcome, SkipReason};
use crate::registry::Category;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current schema version for run reports.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failures,
    /// No failures, but something the run needed was not available.
    Unavailable,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Failures => "failures",
            RunStatus::Unavailable => "unavailable",
        }
    }

    /// Process exit code for the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Passed => 0,
            RunStatus::Failures => 1,
            RunStatus::Unavailable => 2,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub item_id: String,
    pub category: Category,
    pub outcome: Outcome,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub duration_ms: u128,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub cached: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunReport {
    pub schema_version: u32,
    pub scope: String,
    pub started_at_epoch_ms: u128,
    pub finished_at_epoch_ms: u128,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub items: Vec<ItemReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<Vec<String>>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
}

impl RunReport {
    #[cfg(test)]
    pub fn item(&self, id: &str) -> Option<&ItemReport> {
        self.items.iter().find(|item| item.item_id == id)
    }
}

pub fn count_outcomes(items: &[ItemReport]) -> RunCounts {
    let mut counts = RunCounts::default();
    for item in items {
        match item.outcome {
            Outcome::Passed { .. } => counts.passed += 1,
            Outcome::Failed { .. } => counts.failed += 1,
            Outcome::Skipped { .. } => counts.skipped += 1,
            Outcome::Ignored { .. } => counts.ignored += 1,
        }
        if item.cached {
            counts.cached += 1;
        }
    }
    counts
}

/// Failures dominate. Otherwise the run is unavailable when an environmental
/// skip (or cycle) happened anywhere, or when any `automatable` item was
/// skipped for any reason. Ignored items never count.
pub fn run_status(items: &[ItemReport]) -> RunStatus {
    if items
        .iter()
        .any(|item| matches!(item.outcome, Outcome::Failed { .. }))
    {
        return RunStatus::Failures;
    }
    let unavailable = items.iter().any(|item| match &item.outcome {
        Outcome::Skipped { reason, .. } => {
            reason.is_unavailable()
                || *reason == SkipReason::CycleDetected
                || item.category == Category::Automatable
        }
        _ => false,
    });
    if unavailable {
        RunStatus::Unavailable
    } else {
        RunStatus::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureReason;

    fn item(id: &str, outcome: Outcome) -> ItemReport {
        in_category(id, Category::Automatable, outcome)
    }

    fn in_category(id: &str, category: Category, outcome: Outcome) -> ItemReport {
        ItemReport {
            item_id: id.to_string(),
            category,
            outcome,
            cached: false,
            duration_ms: 0,
        }
    }

    #[test]
    fn failures_outrank_unavailable_and_manual_skips_are_neutral() {
        let manual = in_category(
            "review/look",
            Category::HumanRequired,
            Outcome::skipped(SkipReason::ManualOnly, "requires human verification"),
        );
        let missing = item(
            "site/create",
            Outcome::skipped(SkipReason::DependencyMissing, "wp not found"),
        );
        let failed = item(
            "site/delete",
            Outcome::failed(FailureReason::AssertionFailed, "exit 1"),
        );

        assert_eq!(run_status(&[manual.clone()]), RunStatus::Passed);
        assert_eq!(
            run_status(&[manual.clone(), missing.clone()]),
            RunStatus::Unavailable
        );
        assert_eq!(run_status(&[manual, missing, failed]), RunStatus::Failures);
        assert_eq!(RunStatus::Unavailable.exit_code(), 2);
    }

    #[test]
    fn skipped_automatable_items_keep_the_run_from_passing() {
        for reason in [
            SkipReason::NoCheck,
            SkipReason::CapabilityUndeclared,
            SkipReason::ManualOnly,
        ] {
            let skipped = item("site/docs", Outcome::skipped(reason, "not run"));
            assert_eq!(
                run_status(&[item("site/create", Outcome::passed()), skipped]),
                RunStatus::Unavailable,
                "{reason}"
            );
        }

        let ignored = item(
            "site/flaky",
            Outcome::Ignored {
                reason: "upstream outage".to_string(),
            },
        );
        let undeclared = in_category(
            "restore/notes",
            Category::HumanRequired,
            Outcome::skipped(SkipReason::CapabilityUndeclared, "restore"),
        );
        assert_eq!(run_status(&[ignored, undeclared]), RunStatus::Passed);
    }

    #[test]
    fn counts_track_cached_hits() {
        let mut cached = item("site/create", Outcome::passed());
        cached.cached = true;
        let counts = count_outcomes(&[
            cached,
            item("site/list", Outcome::Ignored {
                reason: "flaky".to_string(),
            }),
        ]);
        assert_eq!(counts.passed, 1);
        assert_eq!(counts.ignored, 1);
        assert_eq!(counts.cached, 1);
    }
}
