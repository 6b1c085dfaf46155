//! Verification runs.
//!
//! Each invocation builds a fresh [`RunContext`] (registry, item state, plan,
//! declared capabilities), executes the plan wave by wave on a bounded pool,
//! merges outcomes into a freshly reloaded state file, then writes a new
//! coverage snapshot and swaps the current pointer.
use crate::cache::{cache_key, FileStore, ResultCache};
use crate::cancel::CancelToken;
use crate::check::{CheckExecutor, CommandRunner, ToolLocator};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::coverage::{compute_snapshot, write_snapshot, CoverageSnapshot};
use crate::history::{append_history, HistoryEntry};
use crate::outcome::{FailureReason, Outcome, SkipReason};
use crate::paths::StatePaths;
use crate::registry::{
    load_item_states, write_item_states, Assertion, Category, CheckSpec, EventMatcher, ItemState,
    LastResult, Registry, RegistryEntry, ScenarioDef,
};
use crate::resolver::{resolve_plan, BlockReason, ExecutionPlan, Scope};
use crate::scenario::{
    CheckpointStore, ResourceLocks, ScenarioRequest, ScenarioRunner, ScenarioSettings,
};
use crate::util::{display_path, truncate_string};
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

mod capabilities;
mod pool;
mod report;

pub use capabilities::probe_capabilities;
pub use pool::run_bounded;
pub use report::{
    count_outcomes, run_status, ItemReport, RunCounts, RunReport, RunStatus, REPORT_SCHEMA_VERSION,
};

/// Per-invocation overrides of the engine configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scope: Scope,
    /// Bypass cached outcomes (fresh results are still stored).
    pub refresh: bool,
    pub jobs: Option<usize>,
    pub strict_tools: Option<bool>,
    pub source_revision: Option<String>,
}

impl RunOptions {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            refresh: false,
            jobs: None,
            strict_tools: None,
            source_revision: None,
        }
    }
}

/// External effects the engine goes through; swapped for fakes in tests.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub runner: &'a dyn CommandRunner,
    pub tools: &'a dyn ToolLocator,
    pub clock: &'a dyn Clock,
    pub checkpoints: &'a dyn CheckpointStore,
}

/// Inputs of one run, loaded fresh for every invocation.
pub struct RunContext {
    pub registry: Registry,
    pub plan: ExecutionPlan,
    /// `None` when no planned feature names a capability.
    pub capabilities: Option<BTreeSet<String>>,
    pub started_at_epoch_ms: u128,
}

/// Result of a run: the report and the snapshot it produced.
pub struct RunOutput {
    pub report: RunReport,
    pub snapshot: CoverageSnapshot,
}

enum Work<'r> {
    Assert(&'r Assertion),
    Scenario {
        name: &'r str,
        def: &'r ScenarioDef,
        skip_if_missing: bool,
    },
}

struct Job<'r> {
    id: &'r str,
    cache_key: Option<String>,
    invalidated_by: &'r [EventMatcher],
    work: Work<'r>,
}

enum Triage<'r> {
    Done { outcome: Outcome, cached: bool },
    Run(Job<'r>),
}

pub struct RunEngine<'a> {
    paths: &'a StatePaths,
    config: &'a EngineConfig,
    collab: Collaborators<'a>,
}

impl<'a> RunEngine<'a> {
    pub fn new(paths: &'a StatePaths, config: &'a EngineConfig, collab: Collaborators<'a>) -> Self {
        Self {
            paths,
            config,
            collab,
        }
    }

    /// Load the registry and state and resolve the plan for a scope.
    pub fn prepare(&self, scope: &Scope) -> Result<RunContext> {
        let started_at_epoch_ms = self.collab.clock.now_epoch_ms()?;
        let registry = Registry::load(
            &self.paths.registry_path(&self.config.registry_path),
            &self.paths.items_path(),
        )?;
        let plan = resolve_plan(&registry, scope, started_at_epoch_ms)?;
        let capabilities = self.declared_capabilities(&registry, &plan);
        Ok(RunContext {
            registry,
            plan,
            capabilities,
            started_at_epoch_ms,
        })
    }

    fn declared_capabilities(
        &self,
        registry: &Registry,
        plan: &ExecutionPlan,
    ) -> Option<BTreeSet<String>> {
        let needed = plan
            .waves
            .iter()
            .flatten()
            .filter_map(|id| registry.entry(id))
            .any(|entry| entry.capability.is_some());
        if !needed {
            return None;
        }
        let Some(probe) = registry.definition().capabilities_probe.as_deref() else {
            tracing::warn!("features name capabilities but no capabilities_probe is configured");
            return Some(BTreeSet::new());
        };
        match probe_capabilities(self.collab.runner, probe, self.config.default_timeout()) {
            Ok(capabilities) => {
                tracing::debug!(count = capabilities.len(), "capabilities declared");
                Some(capabilities)
            }
            Err(err) => {
                tracing::warn!("capabilities probe failed; treating all as undeclared: {err:#}");
                Some(BTreeSet::new())
            }
        }
    }

    /// Execute a scope end to end and persist the results.
    pub fn run(&self, options: &RunOptions, cancel: &CancelToken) -> Result<RunOutput> {
        let mut ctx = self.prepare(&options.scope)?;
        tracing::info!(
            scope = %ctx.plan.scope,
            planned = ctx.plan.order().len(),
            blocked = ctx.plan.blocked.len(),
            "verification run started"
        );

        let mut cache = ResultCache::open(
            FileStore::new(self.paths.cache_path()),
            self.collab.clock,
        );
        let purged = cache.purge_expired()?;
        if purged > 0 {
            tracing::debug!(purged, "expired cache entries purged");
        }

        let results = self.execute_plan(&ctx, &mut cache, options, cancel)?;
        cache.flush()?;

        let finished_at_epoch_ms = self.collab.clock.now_epoch_ms()?;
        let items = ordered_items(&ctx.plan, results);
        let merged = self.commit(&items, finished_at_epoch_ms)?;
        for (id, state) in merged {
            ctx.registry.set_state(&id, state);
        }

        let snapshot = compute_snapshot(
            &ctx.registry,
            &ctx.plan.scope,
            options.source_revision.as_deref(),
            finished_at_epoch_ms,
        );
        let snapshot_path = write_snapshot(self.paths, &snapshot)?;

        let report = RunReport {
            schema_version: REPORT_SCHEMA_VERSION,
            scope: ctx.plan.scope.clone(),
            started_at_epoch_ms: ctx.started_at_epoch_ms,
            finished_at_epoch_ms,
            status: run_status(&items),
            counts: count_outcomes(&items),
            cycles: ctx.plan.cycles.clone(),
            cancelled: cancel.is_cancelled(),
            snapshot_path: Some(display_path(&snapshot_path, Some(self.paths.root()))),
            items,
        };
        append_history(
            self.paths,
            &HistoryEntry::from_report(
                &report,
                options.source_revision.as_deref(),
                snapshot.automated_coverage,
            ),
        )?;
        tracing::info!(
            status = %report.status,
            passed = report.counts.passed,
            failed = report.counts.failed,
            skipped = report.counts.skipped,
            cached = report.counts.cached,
            "verification run finished"
        );
        Ok(RunOutput { report, snapshot })
    }

    fn execute_plan<S: crate::cache::CacheStore, C: Clock>(
        &self,
        ctx: &RunContext,
        cache: &mut ResultCache<S, C>,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> Result<BTreeMap<String, ItemReport>> {
        let registry = &ctx.registry;
        let definition = registry.definition();
        let strict_tools = options.strict_tools.unwrap_or(self.config.strict_tools);
        let jobs = options.jobs.unwrap_or(self.config.jobs).max(1);
        let executor = CheckExecutor::new(
            self.collab.runner,
            self.collab.tools,
            &definition.tools,
            self.config.default_timeout(),
        );
        let locks = ResourceLocks::new();
        let scenarios = ScenarioRunner {
            runner: self.collab.runner,
            tools: self.collab.tools,
            checkpoints: self.collab.checkpoints,
            locks: &locks,
            resources: &definition.resources,
            guidance: &definition.tools,
            clock: self.collab.clock,
            settings: ScenarioSettings {
                default_timeout: self.config.default_timeout(),
                resource_wait: self.config.resource_wait(),
                strict_tools,
            },
        };

        let mut results: BTreeMap<String, ItemReport> = BTreeMap::new();
        for blocked in &ctx.plan.blocked {
            let entry = registry.require_entry(&blocked.item_id)?;
            let outcome = match ignored_outcome(registry, entry, ctx.started_at_epoch_ms) {
                Some(outcome) => outcome,
                None => match &blocked.reason {
                    BlockReason::DependencyUnmet { dependency } => {
                        Outcome::dependency_unmet(dependency)
                    }
                    BlockReason::CycleDetected { cycle } => Outcome::skipped(
                        SkipReason::CycleDetected,
                        format!("dependency cycle: {}", cycle.join(" -> ")),
                    ),
                },
            };
            results.insert(entry.id.clone(), item_report(entry, outcome, false, 0));
        }

        for (index, wave) in ctx.plan.waves.iter().enumerate() {
            let mut pending = Vec::new();
            for id in wave {
                let entry = registry.require_entry(id)?;
                match self.triage(ctx, entry, &results, cache, options.refresh, cancel)? {
                    Triage::Done { outcome, cached } => {
                        tracing::debug!(item = %entry.id, outcome = %outcome, cached, "item resolved");
                        results.insert(entry.id.clone(), item_report(entry, outcome, cached, 0));
                    }
                    Triage::Run(job) => pending.push(job),
                }
            }
            tracing::debug!(wave = index, jobs = pending.len(), "executing wave");

            let finished = run_bounded(&pending, jobs, |job| {
                let started = Instant::now();
                let outcome = if cancel.is_cancelled() {
                    Outcome::skipped(SkipReason::Cancelled, "run cancelled before start")
                } else {
                    match &job.work {
                        Work::Assert(assertion) => {
                            executor.execute(assertion).into_outcome(strict_tools)
                        }
                        Work::Scenario {
                            name,
                            def,
                            skip_if_missing,
                        } => scenarios
                            .run(
                                ScenarioRequest {
                                    item_id: job.id,
                                    scenario_id: name,
                                    def,
                                    skip_if_missing: *skip_if_missing,
                                },
                                cancel,
                            )
                            .map(|verdict| verdict.into_outcome())
                            .unwrap_or_else(|err| {
                                Outcome::failed(FailureReason::ExecutionError, format!("{err:#}"))
                            }),
                    }
                };
                (outcome, started.elapsed().as_millis())
            });

            for (job, (outcome, duration_ms)) in pending.iter().zip(finished) {
                if let Some(key) = &job.cache_key {
                    cache.put(key, &outcome, self.config.cache_ttl(), job.invalidated_by)?;
                }
                let entry = registry.require_entry(job.id)?;
                tracing::debug!(item = %entry.id, outcome = %outcome, duration_ms = duration_ms as u64, "item executed");
                results.insert(
                    entry.id.clone(),
                    item_report(entry, outcome, false, duration_ms),
                );
            }
        }
        Ok(results)
    }

    /// Decide an item's outcome without running it, or build its job.
    fn triage<'r, S: crate::cache::CacheStore, C: Clock>(
        &self,
        ctx: &'r RunContext,
        entry: &'r RegistryEntry,
        results: &BTreeMap<String, ItemReport>,
        cache: &ResultCache<S, C>,
        refresh: bool,
        cancel: &CancelToken,
    ) -> Result<Triage<'r>> {
        let done = |outcome: Outcome| -> Result<Triage<'r>> {
            Ok(Triage::Done {
                outcome,
                cached: false,
            })
        };
        if let Some(outcome) = ignored_outcome(&ctx.registry, entry, ctx.started_at_epoch_ms) {
            return done(outcome);
        }
        if let Some(dep) = entry.depends_on.iter().find(|dep| {
            results
                .get(dep.as_str())
                .is_some_and(|report| !report.outcome.is_passed())
        }) {
            return done(Outcome::dependency_unmet(dep));
        }
        if entry.category() == Category::HumanRequired || !entry.item.automatable {
            return done(Outcome::skipped(
                SkipReason::ManualOnly,
                "requires human verification",
            ));
        }
        let Some(check) = entry.item.check.as_ref() else {
            return done(Outcome::skipped(SkipReason::NoCheck, "no check defined"));
        };
        if let (Some(capability), Some(declared)) = (&entry.capability, &ctx.capabilities) {
            if !declared.contains(capability) {
                return done(Outcome::skipped(
                    SkipReason::CapabilityUndeclared,
                    format!("host does not declare capability `{capability}`"),
                ));
            }
        }
        if cancel.is_cancelled() {
            return done(Outcome::skipped(
                SkipReason::Cancelled,
                "run cancelled before start",
            ));
        }

        let (work, scenario, invalidated_by) = match check {
            CheckSpec::Assert(assertion) => (
                Work::Assert(assertion),
                None,
                assertion.invalidated_by.as_slice(),
            ),
            CheckSpec::Scenario { scenario } => {
                let def = ctx.registry.scenario(scenario).ok_or_else(|| {
                    anyhow!("item {} references unknown scenario {scenario}", entry.id)
                })?;
                (
                    Work::Scenario {
                        name: scenario,
                        def,
                        skip_if_missing: entry.item.skip_if_missing,
                    },
                    Some(def),
                    def.invalidated_by.as_slice(),
                )
            }
        };
        let key = cache_key(check, scenario)?;
        if !refresh {
            if let Some(outcome) = cache.get(&key)? {
                return Ok(Triage::Done {
                    outcome,
                    cached: true,
                });
            }
        }
        Ok(Triage::Run(Job {
            id: &entry.id,
            cache_key: Some(key),
            invalidated_by,
            work,
        }))
    }

    /// Merge outcomes into the state file as it is now on disk.
    fn commit(&self, items: &[ItemReport], now_epoch_ms: u128) -> Result<BTreeMap<String, ItemState>> {
        let path = self.paths.items_path();
        let mut states = load_item_states(&path)
            .with_context(|| format!("reload {} for commit", path.display()))?;
        for item in items {
            apply_outcome(
                states.entry(item.item_id.clone()).or_default(),
                &item.outcome,
                now_epoch_ms,
            );
        }
        write_item_states(&path, &states)?;
        Ok(states)
    }
}

fn ignored_outcome(registry: &Registry, entry: &RegistryEntry, now_epoch_ms: u128) -> Option<Outcome> {
    registry
        .state(&entry.id)
        .active_ignore(now_epoch_ms)
        .map(|mark| Outcome::Ignored {
            reason: mark.reason.clone(),
        })
}

fn item_report(entry: &RegistryEntry, outcome: Outcome, cached: bool, duration_ms: u128) -> ItemReport {
    ItemReport {
        item_id: entry.id.clone(),
        category: entry.category(),
        outcome,
        cached,
        duration_ms,
    }
}

/// Plan order first, then items that never entered a wave.
fn ordered_items(plan: &ExecutionPlan, mut results: BTreeMap<String, ItemReport>) -> Vec<ItemReport> {
    let mut items = Vec::with_capacity(results.len());
    for id in plan.order() {
        if let Some(item) = results.remove(&id) {
            items.push(item);
        }
    }
    items.extend(results.into_values());
    items
}

/// Upper bound on the detail persisted per item; reports keep the full text.
const MAX_DETAIL_BYTES: usize = 2_048;

/// Fold one outcome into an item's persisted state.
///
/// A pass verifies, a failure un-verifies (including auto-resolved items).
/// Skips only record themselves on items that are not already verified.
pub fn apply_outcome(state: &mut ItemState, outcome: &Outcome, now_epoch_ms: u128) {
    match outcome {
        Outcome::Passed { detail } => {
            state.verified = true;
            state.last_result = Some(LastResult::Passed);
            state.last_run_at_epoch_ms = Some(now_epoch_ms);
            state.last_detail = detail.clone();
        }
        Outcome::Failed { reason, detail } => {
            state.verified = false;
            state.last_result = Some(LastResult::Failed);
            state.last_run_at_epoch_ms = Some(now_epoch_ms);
            state.last_detail = Some(truncate_string(&format!("{reason}: {detail}"), MAX_DETAIL_BYTES));
        }
        Outcome::Skipped { reason, detail, .. } => {
            if state.verified || matches!(reason, SkipReason::ManualOnly | SkipReason::NoCheck) {
                return;
            }
            state.last_result = Some(LastResult::Skipped);
            state.last_run_at_epoch_ms = Some(now_epoch_ms);
            state.last_detail = Some(truncate_string(&format!("{reason}: {detail}"), MAX_DETAIL_BYTES));
        }
        Outcome::Ignored { .. } => {}
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
