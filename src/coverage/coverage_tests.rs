use super::*;
use crate::paths::StatePaths;
use crate::registry::fixtures::*;
use crate::registry::{IgnoreMark, ItemState, ScenarioDef, StateTransition, StepDef};

const NOW: u128 = 1_700_000_000_000;

fn scenario_b() -> Registry {
    let automated = (0..10)
        .map(|n| assert_item(&format!("auto{n}"), "true"))
        .collect();
    let manual = (0..5).map(|n| manual_item(&format!("manual{n}"))).collect();
    let mut registry = registry(vec![feature("ops", automated), feature("review", manual)]);
    for n in 0..10 {
        let state = if n < 7 {
            verified(LastResult::Passed)
        } else {
            failed()
        };
        registry.set_state(&format!("ops/auto{n}"), state);
    }
    for n in 0..2 {
        registry.set_state(
            &format!("review/manual{n}"),
            verified(LastResult::ManuallyResolved),
        );
    }
    registry
}

#[test]
fn category_correct_percentages() {
    let snapshot = compute_snapshot(&scenario_b(), "all", Some("abc123"), NOW);

    assert_eq!(snapshot.automated_coverage, Some(70.0));
    assert_eq!(snapshot.manual_coverage, Some(40.0));
    assert_eq!(snapshot.overall_coverage, Some(60.0));
    assert_eq!(snapshot.functional_coverage, None);
    assert!(snapshot.inconsistencies.is_empty());
    assert_eq!(
        snapshot.breakdown(Category::Automatable),
        CategoryBreakdown {
            total: 10,
            verified: 7,
            ignored: 0
        }
    );
    assert_eq!(snapshot.source_revision.as_deref(), Some("abc123"));
}

#[test]
fn non_automatable_verified_item_is_flagged_not_counted() {
    let mut stale = assert_item("legacy", "true");
    stale.automatable = false;
    let mut registry = registry(vec![feature(
        "ops",
        vec![assert_item("fresh", "true"), stale],
    )]);
    registry.set_state("ops/fresh", verified(LastResult::Passed));
    registry.set_state("ops/legacy", verified(LastResult::Passed));

    let snapshot = compute_snapshot(&registry, "all", None, NOW);

    assert_eq!(snapshot.automated_coverage, Some(50.0));
    assert_eq!(
        snapshot.inconsistencies,
        vec![Inconsistency {
            item_id: "ops/legacy".to_string(),
            kind: InconsistencyKind::ManualMarkedVerified,
            detail: "category=automatable automatable=false verified=true".to_string(),
        }]
    );
    let automatable = snapshot.breakdown(Category::Automatable);
    assert!(automatable.verified <= automatable.total);
}

#[test]
fn automatable_flag_on_manual_category_is_a_mismatch() {
    let mut odd = manual_item("eyeball");
    odd.automatable = true;
    let registry = registry(vec![feature("review", vec![odd])]);

    let snapshot = compute_snapshot(&registry, "all", None, NOW);
    assert_eq!(snapshot.inconsistencies.len(), 1);
    assert_eq!(
        snapshot.inconsistencies[0].kind,
        InconsistencyKind::CategoryMismatch
    );
}

#[test]
fn active_ignores_leave_every_denominator() {
    let mut registry = scenario_b();
    let ignore = |until| ItemState {
        ignored: Some(IgnoreMark {
            reason: "flaky upstream".to_string(),
            marked_at_epoch_ms: NOW - 10,
            until_epoch_ms: until,
        }),
        ..failed()
    };
    registry.set_state("ops/auto9", ignore(None));
    registry.set_state("ops/auto8", ignore(Some(NOW - 1)));

    let snapshot = compute_snapshot(&registry, "all", None, NOW);

    // auto9 drops out; the expired mark on auto8 no longer applies.
    assert_eq!(
        snapshot.breakdown(Category::Automatable),
        CategoryBreakdown {
            total: 9,
            verified: 7,
            ignored: 1
        }
    );
    assert_eq!(snapshot.automated_coverage, Some(77.78));
    assert_eq!(snapshot.overall_coverage, Some(64.29));
}

#[test]
fn functional_coverage_counts_passed_scenarios() {
    let mut def = definition(vec![feature(
        "backup",
        vec![
            scenario_item("restore", "backup_restore"),
            scenario_item("restore_again", "backup_restore"),
        ],
    )]);
    def.scenarios.insert(
        "backup_restore".to_string(),
        ScenarioDef {
            description: String::new(),
            steps: vec![StepDef {
                name: "restore".to_string(),
                invoke: "site restore".to_string(),
                expect_exit_code: 0,
                capture: None,
                expect: StateTransition::Any,
                timeout_seconds: None,
            }],
            resources: Vec::new(),
            invalidated_by: Vec::new(),
        },
    );
    let mut registry = Registry::new(def, BTreeMap::new()).expect("registry");
    registry.set_state("backup/restore", verified(LastResult::Passed));
    registry.set_state("backup/restore_again", verified(LastResult::AutoResolved));

    let snapshot = compute_snapshot(&registry, "all", None, NOW);
    assert_eq!(snapshot.scenarios, ScenarioTally { total: 2, passed: 1 });
    assert_eq!(snapshot.functional_coverage, Some(50.0));
}

#[test]
fn empty_denominators_are_null() {
    assert_eq!(percentage(0, 0), None);
    assert_eq!(percentage(1, 3), Some(33.33));
    assert_eq!(percentage(2, 3), Some(66.67));

    let registry = registry(vec![feature("ops", Vec::new())]);
    let value = serde_json::to_value(compute_snapshot(&registry, "all", None, NOW)).expect("json");
    assert!(value["automated_coverage"].is_null());
    assert_eq!(value["per_category_breakdown"]["human_required"]["total"], 0);
}

#[test]
fn snapshots_are_immutable_and_pointer_is_swapped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::new(dir.path().to_path_buf());
    assert!(load_current(&paths).expect("load").is_none());

    let first = compute_snapshot(&scenario_b(), "all", None, NOW);
    let first_path = write_snapshot(&paths, &first).expect("write first");
    let second = compute_snapshot(&scenario_b(), "category=automatable", None, NOW);
    let second_path = write_snapshot(&paths, &second).expect("write second");

    assert_ne!(first_path, second_path);
    let kept: CoverageSnapshot = crate::util::read_json(&first_path).expect("first kept");
    assert_eq!(kept.scope, "all");
    let current = load_current(&paths).expect("load").expect("current");
    assert_eq!(current.scope, "category=automatable");
}
