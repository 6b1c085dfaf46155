//! Inbound completion events and coverage reporting.
use super::Workspace;
use crate::cache::{FileStore, ResultCache};
use crate::cli::{CoverageArgs, EventArgs};
use crate::clock::{Clock, SystemClock};
use crate::coverage::{compute_snapshot, load_current};
use crate::dispatch::{append_event, dispatch, CompletionEvent, DispatchReport};
use crate::output::{print_coverage, print_dispatch, print_json};
use anyhow::Result;

/// Record one host completion event, then auto-resolve and invalidate.
pub fn record_event<C: Clock>(
    workspace: &Workspace,
    event: &CompletionEvent,
    clock: C,
) -> Result<DispatchReport> {
    append_event(&workspace.paths.events_path(), event)?;
    let now = clock.now_epoch_ms()?;
    let mut registry = workspace.load_registry()?;
    let mut cache = ResultCache::open(FileStore::new(workspace.paths.cache_path()), clock);
    let report = dispatch(&mut registry, &mut cache, event, now)?;
    if !report.resolved.is_empty() {
        workspace.save_states(&registry)?;
    }
    cache.flush()?;
    Ok(report)
}

pub fn run_event(workspace: &Workspace, args: &EventArgs, json: bool) -> Result<()> {
    let event = CompletionEvent {
        command_name: args.command.clone(),
        arguments: args.arguments.clone(),
        exit_code: args.exit_code,
        timestamp_epoch_ms: SystemClock.now_epoch_ms()?,
    };
    let report = record_event(workspace, &event, SystemClock)?;
    if json {
        print_json(&report)
    } else {
        print_dispatch(&report);
        Ok(())
    }
}

pub fn run_coverage(workspace: &Workspace, args: &CoverageArgs, json: bool) -> Result<()> {
    let current = if args.recompute {
        None
    } else {
        load_current(&workspace.paths)?
    };
    let snapshot = match current {
        Some(snapshot) => snapshot,
        None => {
            let registry = workspace.load_registry()?;
            let now = SystemClock.now_epoch_ms()?;
            compute_snapshot(&registry, "all", None, now)
        }
    };
    if json {
        print_json(&snapshot)
    } else {
        print_coverage(&snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{cache_key, CacheStore, DEFAULT_TTL};
    use crate::clock::ManualClock;
    use crate::outcome::Outcome;
    use crate::registry::fixtures::{assert_item, definition, feature};
    use crate::registry::{write_definition, AutoResolveRule, EventMatcher, LastResult};

    #[test]
    fn successful_event_resolves_targets_and_drops_matching_cache_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::open(dir.path()).expect("workspace");
        let mut def = definition(vec![feature(
            "site",
            vec![assert_item("backup", "wp backup create")],
        )]);
        def.auto_resolve = vec![AutoResolveRule {
            on: EventMatcher {
                command: "backup".to_string(),
                arg_pattern: None,
            },
            resolves: vec!["site/backup".to_string()],
        }];
        write_definition(&ws.registry_path(), &def).expect("registry");

        let clock = ManualClock::at(10_000);
        let check = def.features[0].items[0].check.clone().expect("check");
        let key = cache_key(&check, None).expect("key");
        {
            let mut cache = ResultCache::open(FileStore::new(ws.paths.cache_path()), &clock);
            let matcher = EventMatcher {
                command: "backup".to_string(),
                arg_pattern: None,
            };
            cache
                .put(&key, &Outcome::passed(), DEFAULT_TTL, &[matcher])
                .expect("put");
            cache.flush().expect("flush");
        }

        let event = CompletionEvent {
            command_name: "backup".to_string(),
            arguments: vec!["--site".to_string(), "demo".to_string()],
            exit_code: 0,
            timestamp_epoch_ms: 10_000,
        };
        let report = record_event(&ws, &event, &clock).expect("dispatch");
        assert_eq!(report.resolved, vec!["site/backup".to_string()]);
        assert_eq!(report.invalidated_cache_entries, 1);

        let registry = ws.load_registry().expect("reload");
        assert_eq!(
            registry.state("site/backup").last_result,
            Some(LastResult::AutoResolved)
        );
        assert!(FileStore::new(ws.paths.cache_path())
            .load()
            .expect("cache")
            .is_empty());
        let log = std::fs::read_to_string(ws.paths.events_path()).expect("event log");
        assert_eq!(log.lines().count(), 1);
    }
}
