use super::*;
use crate::registry::fixtures::*;
use crate::registry::{IgnoreMark, ItemState, LastResult, Registry};

fn position(order: &[String], id: &str) -> usize {
    order
        .iter()
        .position(|candidate| candidate == id)
        .unwrap_or_else(|| panic!("{id} missing from order {order:?}"))
}

#[test]
fn plan_orders_dependencies_first_in_waves() {
    let registry = registry(vec![feature(
        "backup",
        vec![
            with_deps(assert_item("verify", "true"), &["restore"]),
            with_deps(assert_item("restore", "true"), &["create"]),
            assert_item("create", "true"),
            assert_item("list", "true"),
        ],
    )]);
    let plan = resolve_plan(&registry, &Scope::All, 0).expect("plan");

    assert_eq!(
        plan.waves,
        vec![
            vec!["backup/create".to_string(), "backup/list".to_string()],
            vec!["backup/restore".to_string()],
            vec!["backup/verify".to_string()],
        ]
    );
    let order = plan.order();
    for entry in registry.entries() {
        for dep in &entry.depends_on {
            assert!(position(&order, dep) < position(&order, &entry.id));
        }
    }
    assert!(plan.blocked.is_empty());
}

#[test]
fn verified_dependencies_are_satisfied_and_not_rerun() {
    let mut registry = registry(vec![feature(
        "backup",
        vec![
            assert_item("create", "true"),
            with_deps(assert_item("restore", "true"), &["create"]),
        ],
    )]);
    registry.set_state("backup/create", verified(LastResult::Passed));

    let plan = resolve_plan(&registry, &Scope::Item("backup/restore".to_string()), 0)
        .expect("plan");
    assert_eq!(plan.order(), vec!["backup/restore".to_string()]);
}

#[test]
fn unverified_dependencies_are_pulled_into_single_item_scope() {
    let registry = registry(vec![feature(
        "backup",
        vec![
            assert_item("create", "true"),
            with_deps(assert_item("restore", "true"), &["create"]),
        ],
    )]);
    let plan = resolve_plan(&registry, &Scope::Item("backup/restore".to_string()), 0)
        .expect("plan");
    assert_eq!(
        plan.order(),
        vec!["backup/create".to_string(), "backup/restore".to_string()]
    );
    assert!(plan.requested.contains("backup/restore"));
    assert!(!plan.requested.contains("backup/create"));
}

#[test]
fn two_item_cycle_reports_both_ids() {
    let registry = registry(vec![feature(
        "site",
        vec![
            with_deps(assert_item("a", "true"), &["b"]),
            with_deps(assert_item("b", "true"), &["a"]),
        ],
    )]);
    let err = resolve_plan(&registry, &Scope::All, 0).expect_err("cycle");
    match err {
        EngineError::CycleDetected { ids } => {
            assert_eq!(ids, vec!["site/a".to_string(), "site/b".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cycle_blocks_only_its_component() {
    let registry = registry(vec![
        feature(
            "site",
            vec![
                with_deps(assert_item("a", "true"), &["b"]),
                with_deps(assert_item("b", "true"), &["a"]),
                with_deps(assert_item("c", "true"), &["a"]),
            ],
        ),
        feature("backup", vec![assert_item("create", "true")]),
    ]);
    let plan = resolve_plan(&registry, &Scope::All, 0).expect("plan");

    assert_eq!(plan.order(), vec!["backup/create".to_string()]);
    assert_eq!(
        plan.cycles,
        vec![vec!["site/a".to_string(), "site/b".to_string()]]
    );
    for id in ["site/a", "site/b", "site/c"] {
        assert!(matches!(
            plan.blocked_reason(id),
            Some(BlockReason::CycleDetected { .. })
        ));
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let registry = registry(vec![feature(
        "site",
        vec![with_deps(assert_item("a", "true"), &["a"])],
    )]);
    let err = resolve_plan(&registry, &Scope::Item("site/a".to_string()), 0)
        .expect_err("self cycle");
    assert!(matches!(err, EngineError::CycleDetected { ids } if ids == vec!["site/a".to_string()]));
}

#[test]
fn ignored_dependency_blocks_dependents_transitively() {
    let mut registry = registry(vec![feature(
        "backup",
        vec![
            assert_item("create", "true"),
            with_deps(assert_item("restore", "true"), &["create"]),
            with_deps(assert_item("verify", "true"), &["restore"]),
        ],
    )]);
    registry.set_state(
        "backup/create",
        ItemState {
            ignored: Some(IgnoreMark {
                reason: "upstream outage".to_string(),
                marked_at_epoch_ms: 0,
                until_epoch_ms: None,
            }),
            ..verified(LastResult::Passed)
        },
    );

    let plan = resolve_plan(&registry, &Scope::All, 10).expect("plan");
    assert_eq!(
        plan.blocked_reason("backup/restore"),
        Some(&BlockReason::DependencyUnmet {
            dependency: "backup/create".to_string()
        })
    );
    assert_eq!(
        plan.blocked_reason("backup/verify"),
        Some(&BlockReason::DependencyUnmet {
            dependency: "backup/restore".to_string()
        })
    );
    assert_eq!(plan.order(), vec!["backup/create".to_string()]);
}

#[test]
fn unverified_manual_dependency_is_unmet() {
    let registry = registry(vec![feature(
        "docs",
        vec![
            manual_item("reviewed"),
            with_deps(assert_item("published", "true"), &["reviewed"]),
        ],
    )]);
    let plan = resolve_plan(&registry, &Scope::Category(Category::Automatable), 0)
        .expect("plan");
    assert_eq!(
        plan.blocked_reason("docs/published"),
        Some(&BlockReason::DependencyUnmet {
            dependency: "docs/reviewed".to_string()
        })
    );
    assert!(plan.waves.is_empty());
}

#[test]
fn unknown_item_scope_is_an_error() {
    let registry = registry(vec![feature("backup", vec![assert_item("create", "true")])]);
    let err = resolve_plan(&registry, &Scope::Item("backup/missing".to_string()), 0)
        .expect_err("unknown");
    assert!(matches!(err, EngineError::UnknownItem(_)));
}

#[test]
fn resolving_twice_yields_identical_plans() {
    let registry = Registry::new(
        definition(vec![feature(
            "site",
            vec![
                assert_item("z", "true"),
                assert_item("m", "true"),
                with_deps(assert_item("a", "true"), &["z", "m"]),
            ],
        )]),
        Default::default(),
    )
    .expect("registry");
    let first = resolve_plan(&registry, &Scope::All, 0).expect("first");
    let second = resolve_plan(&registry, &Scope::All, 0).expect("second");
    assert_eq!(first.waves, second.waves);
    assert_eq!(
        first.order(),
        vec!["site/m".to_string(), "site/z".to_string(), "site/a".to_string()]
    );
}
