use super::*;
use crate::cache::{MemoryStore, DEFAULT_TTL};
use crate::clock::ManualClock;
use crate::outcome::Outcome;
use crate::registry::fixtures::*;
use crate::registry::{AutoResolveRule, IgnoreMark, ItemState, LastResult};

fn site_registry() -> Registry {
    let mut def = definition(vec![feature(
        "site",
        vec![
            assert_item("test_instance_removed", "true"),
            assert_item("orphans_cleaned", "true"),
            assert_item("listed", "true"),
        ],
    )]);
    def.auto_resolve = vec![AutoResolveRule {
        on: EventMatcher {
            command: "delete".to_string(),
            arg_pattern: Some("^test-".to_string()),
        },
        resolves: vec![
            "site/test_instance_removed".to_string(),
            "site/orphans_cleaned".to_string(),
        ],
    }];
    Registry::new(def, Default::default()).expect("registry")
}

fn event(command: &str, args: &[&str], exit_code: i32) -> CompletionEvent {
    CompletionEvent {
        command_name: command.to_string(),
        arguments: args.iter().map(|arg| arg.to_string()).collect(),
        exit_code,
        timestamp_epoch_ms: 5,
    }
}

#[test]
fn successful_matching_event_auto_resolves_targets() {
    let mut registry = site_registry();
    let clock = ManualClock::at(0);
    let mut cache = ResultCache::open(MemoryStore::new(), &clock);

    let report = dispatch(&mut registry, &mut cache, &event("delete", &["test-42"], 0), 7)
        .expect("dispatch");
    assert_eq!(
        report.resolved,
        vec![
            "site/test_instance_removed".to_string(),
            "site/orphans_cleaned".to_string()
        ]
    );
    let state = registry.state("site/orphans_cleaned");
    assert!(state.verified);
    assert_eq!(state.last_result, Some(LastResult::AutoResolved));
    assert_eq!(state.last_run_at_epoch_ms, Some(7));
    assert!(!registry.state("site/listed").verified);
}

#[test]
fn failed_or_unmatched_events_resolve_nothing() {
    let mut registry = site_registry();
    let clock = ManualClock::at(0);
    let mut cache = ResultCache::open(MemoryStore::new(), &clock);

    for event in [
        event("delete", &["test-42"], 1),
        event("delete", &["prod-1"], 0),
        event("create", &["test-42"], 0),
    ] {
        let report = dispatch(&mut registry, &mut cache, &event, 7).expect("dispatch");
        assert!(report.resolved.is_empty(), "{event:?}");
    }
    assert!(registry.states().is_empty());
}

#[test]
fn ignored_targets_are_left_untouched() {
    let mut registry = site_registry();
    registry.set_state(
        "site/orphans_cleaned",
        ItemState {
            ignored: Some(IgnoreMark {
                reason: "manual cleanup".to_string(),
                marked_at_epoch_ms: 0,
                until_epoch_ms: None,
            }),
            ..ItemState::default()
        },
    );
    let clock = ManualClock::at(0);
    let mut cache = ResultCache::open(MemoryStore::new(), &clock);

    let report = dispatch(&mut registry, &mut cache, &event("delete", &["test-1"], 0), 7)
        .expect("dispatch");
    assert_eq!(report.ignored, vec!["site/orphans_cleaned".to_string()]);
    assert!(!registry.state("site/orphans_cleaned").verified);
}

#[test]
fn dispatch_invalidates_matching_cache_entries() {
    let mut registry = site_registry();
    let clock = ManualClock::at(0);
    let mut cache = ResultCache::open(MemoryStore::new(), &clock);
    let matcher = EventMatcher {
        command: "backup".to_string(),
        arg_pattern: None,
    };
    cache
        .put("restore", &Outcome::passed(), DEFAULT_TTL, &[matcher])
        .expect("put");

    let report = dispatch(&mut registry, &mut cache, &event("backup", &[], 0), 7)
        .expect("dispatch");
    assert_eq!(report.invalidated_cache_entries, 1);
    assert!(report.resolved.is_empty());
    assert!(cache.is_empty());
}

#[test]
fn events_append_to_the_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state").join("events.jsonl");
    append_event(&path, &event("delete", &["test-1"], 0)).expect("append");
    append_event(&path, &event("backup", &[], 1)).expect("append");
    let text = std::fs::read_to_string(&path).expect("read");
    let events: Vec<CompletionEvent> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("parse"))
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].exit_code, 1);
}
