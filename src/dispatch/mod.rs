//! Auto-resolution of items from host command completion events.
//!
//! The host CLI reports every finished command. A successful event that
//! matches an `auto_resolve` rule marks the rule's items verified without
//! running their checks, and drops cached results whose `invalidated_by`
//! matchers accept the event. A later full run may still flip those items
//! back.
use crate::cache::{CacheStore, ResultCache};
use crate::clock::Clock;
use crate::registry::{EventMatcher, Registry};
use crate::util::append_jsonl;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `(command_name, arguments, exit_code, timestamp)` pushed by the host CLI.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub command_name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    pub exit_code: i32,
    pub timestamp_epoch_ms: u128,
}

impl CompletionEvent {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Command name must be equal; an argument pattern must match some argument.
    pub fn matches(&self, matcher: &EventMatcher) -> bool {
        if matcher.command != self.command_name {
            return false;
        }
        let Some(pattern) = &matcher.arg_pattern else {
            return true;
        };
        match Regex::new(pattern) {
            Ok(regex) => self.arguments.iter().any(|arg| regex.is_match(arg)),
            Err(err) => {
                tracing::warn!(pattern = %pattern, "invalid event argument pattern: {err}");
                false
            }
        }
    }
}

/// What one event changed.
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub command_name: String,
    pub exit_code: i32,
    pub resolved: Vec<String>,
    /// Targets left untouched because they are ignored.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
    pub invalidated_cache_entries: usize,
}

/// Apply one completion event to item state and the result cache.
pub fn dispatch<S: CacheStore, C: Clock>(
    registry: &mut Registry,
    cache: &mut ResultCache<S, C>,
    event: &CompletionEvent,
    now_epoch_ms: u128,
) -> Result<DispatchReport> {
    let mut report = DispatchReport {
        command_name: event.command_name.clone(),
        exit_code: event.exit_code,
        ..DispatchReport::default()
    };
    if !event.succeeded() {
        tracing::debug!(command = %event.command_name, exit_code = event.exit_code, "event ignored: command failed");
        return Ok(report);
    }

    let targets: Vec<String> = registry
        .definition()
        .auto_resolve
        .iter()
        .filter(|rule| event.matches(&rule.on))
        .flat_map(|rule| rule.resolves.iter().cloned())
        .collect();
    for id in targets {
        if report.resolved.contains(&id) || report.ignored.contains(&id) {
            continue;
        }
        if registry.is_ignored(&id, now_epoch_ms) {
            report.ignored.push(id);
            continue;
        }
        registry.mark_auto_resolved(
            &id,
            format!("auto-resolved by `{}`", event.command_name),
            now_epoch_ms,
        )?;
        report.resolved.push(id);
    }

    report.invalidated_cache_entries = cache.invalidate_for_event(event);
    tracing::info!(
        command = %event.command_name,
        resolved = report.resolved.len(),
        invalidated = report.invalidated_cache_entries,
        "completion event dispatched"
    );
    Ok(report)
}

/// Append an inbound event to the event log.
pub fn append_event(path: &Path, event: &CompletionEvent) -> Result<()> {
    append_jsonl(path, event)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
