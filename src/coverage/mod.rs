//! Category-correct coverage metrics.
//!
//! Each item only feeds the denominator of its own category. An item that is
//! not automatable but carries `verified=true` is reported as an
//! inconsistency and never counted as automated coverage.
use crate::registry::{Category, CheckSpec, LastResult, Registry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod snapshot;

pub use snapshot::{load_current, write_snapshot};

/// Current schema version for coverage snapshots.
pub const COVERAGE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// `automatable=false` with `verified=true` outside the manual category.
    ManualMarkedVerified,
    /// The `automatable` flag disagrees with the item's category.
    CategoryMismatch,
}

impl InconsistencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InconsistencyKind::ManualMarkedVerified => "manual_marked_verified",
            InconsistencyKind::CategoryMismatch => "category_mismatch",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    pub item_id: String,
    pub kind: InconsistencyKind,
    pub detail: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct CategoryBreakdown {
    pub total: usize,
    pub verified: usize,
    pub ignored: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ScenarioTally {
    pub total: usize,
    pub passed: usize,
}

/// Immutable coverage aggregate; superseded by the next snapshot.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CoverageSnapshot {
    pub schema_version: u32,
    pub automated_coverage: Option<f64>,
    pub manual_coverage: Option<f64>,
    pub functional_coverage: Option<f64>,
    pub overall_coverage: Option<f64>,
    pub per_category_breakdown: BTreeMap<Category, CategoryBreakdown>,
    pub scenarios: ScenarioTally,
    #[serde(default)]
    pub inconsistencies: Vec<Inconsistency>,
    pub generated_at_epoch_ms: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
    pub scope: String,
}

impl CoverageSnapshot {
    pub fn breakdown(&self, category: Category) -> CategoryBreakdown {
        self.per_category_breakdown
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }
}

/// Percentage rounded to two decimals; `None` for an empty denominator.
pub fn percentage(numerator: usize, denominator: usize) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    let ratio = numerator as f64 * 100.0 / denominator as f64;
    Some((ratio * 100.0).round() / 100.0)
}

/// Aggregate the registry's definitions and current state into a snapshot.
pub fn compute_snapshot(
    registry: &Registry,
    scope: &str,
    source_revision: Option<&str>,
    now_epoch_ms: u128,
) -> CoverageSnapshot {
    let mut breakdown: BTreeMap<Category, CategoryBreakdown> = Category::ALL
        .into_iter()
        .map(|category| (category, CategoryBreakdown::default()))
        .collect();
    let mut scenarios = ScenarioTally::default();
    let mut inconsistencies = Vec::new();
    let mut total_all = 0;

    for entry in registry.entries() {
        let item = &entry.item;
        let state = registry.state(&entry.id);
        let slot = breakdown.entry(item.category).or_default();
        if state.active_ignore(now_epoch_ms).is_some() {
            slot.ignored += 1;
            continue;
        }
        slot.total += 1;
        total_all += 1;

        if let Some(kind) = inconsistency(item.category, item.automatable, state.verified) {
            inconsistencies.push(Inconsistency {
                item_id: entry.id.clone(),
                kind,
                detail: format!(
                    "category={} automatable={} verified={}",
                    item.category, item.automatable, state.verified
                ),
            });
        }

        // A stale verified flag on a non-automatable item is not automated coverage.
        if state.verified && (item.category != Category::Automatable || item.automatable) {
            slot.verified += 1;
        }

        if matches!(item.check, Some(CheckSpec::Scenario { .. })) {
            scenarios.total += 1;
            if state.verified && state.last_result == Some(LastResult::Passed) {
                scenarios.passed += 1;
            }
        }
    }

    for issue in &inconsistencies {
        tracing::warn!(
            item = %issue.item_id,
            kind = issue.kind.as_str(),
            "registry inconsistency: {}",
            issue.detail
        );
    }

    let automatable = breakdown
        .get(&Category::Automatable)
        .cloned()
        .unwrap_or_default();
    let manual = breakdown
        .get(&Category::HumanRequired)
        .cloned()
        .unwrap_or_default();
    debug_assert!(automatable.verified <= automatable.total);

    CoverageSnapshot {
        schema_version: COVERAGE_SCHEMA_VERSION,
        automated_coverage: percentage(automatable.verified, automatable.total),
        manual_coverage: percentage(manual.verified, manual.total),
        functional_coverage: percentage(scenarios.passed, scenarios.total),
        overall_coverage: percentage(automatable.verified + manual.verified, total_all),
        per_category_breakdown: breakdown,
        scenarios,
        inconsistencies,
        generated_at_epoch_ms: now_epoch_ms,
        source_revision: source_revision.map(str::to_string),
        scope: scope.to_string(),
    }
}

fn inconsistency(category: Category, automatable: bool, verified: bool) -> Option<InconsistencyKind> {
    match (category, automatable) {
        (Category::HumanRequired, false) => None,
        (Category::HumanRequired, true) => Some(InconsistencyKind::CategoryMismatch),
        (_, false) if verified => Some(InconsistencyKind::ManualMarkedVerified),
        (Category::Automatable, false) => Some(InconsistencyKind::CategoryMismatch),
        _ => None,
    }
}

#[cfg(test)]
#[path = "coverage_tests.rs"]
mod tests;
