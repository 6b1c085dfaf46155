//! Multi-step scenario execution with checkpoint/resume.
//!
//! Each step captures state, invokes a collaborator, captures state again and
//! asserts the expected transition. Progress is checkpointed after every step
//! so an interrupted run resumes at the first incomplete step. Before resuming,
//! the state captured after the last completed step is re-captured; if it no
//! longer holds the checkpoint is discarded and the scenario starts over.
use crate::cancel::CancelToken;
use crate::check::{first_missing_tool, CommandRunner, FailureDetail, Invocation, ToolLocator};
use crate::clock::Clock;
use crate::outcome::{FailureReason, Outcome, SkipReason};
use crate::registry::{ResourceDef, ScenarioDef, StepDef};
use crate::util::sha256_hex;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::time::Duration;

mod capture;
mod checkpoint;
mod locks;
mod state;

pub use capture::{assert_transition, capture_state, Captured, StateSnapshot};
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, CHECKPOINT_SCHEMA_VERSION};
#[cfg(test)]
pub use checkpoint::MemoryCheckpointStore;
pub use locks::ResourceLocks;
pub use state::{ScenarioMachine, ScenarioState};

/// Digest of a scenario definition; a checkpoint is only valid for the
/// definition it was written against.
pub fn scenario_digest(def: &ScenarioDef) -> Result<String> {
    let bytes = serde_json::to_vec(def).context("serialize scenario definition")?;
    Ok(sha256_hex(&bytes))
}

/// Terminal (or checkpointed) result of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioVerdict {
    Passed {
        steps_run: usize,
        resumed_from: Option<usize>,
    },
    Failed {
        step_index: usize,
        step_name: String,
        detail: FailureDetail,
    },
    Skipped {
        reason: SkipReason,
        detail: String,
    },
    /// Cancelled between steps; `step_index` is the next step to run.
    Checkpointed { step_index: usize },
}

impl ScenarioVerdict {
    pub fn into_outcome(self) -> Outcome {
        match self {
            ScenarioVerdict::Passed {
                steps_run,
                resumed_from,
            } => Outcome::Passed {
                detail: Some(match resumed_from {
                    Some(step) => format!("{steps_run} step(s) run, resumed at step {}", step + 1),
                    None => format!("{steps_run} step(s) run"),
                }),
            },
            ScenarioVerdict::Failed {
                step_index,
                step_name,
                detail,
            } => Outcome::failed(
                detail.reason,
                format!(
                    "step {} ({step_name}): {}",
                    step_index + 1,
                    detail.summary()
                ),
            ),
            ScenarioVerdict::Skipped { reason, detail } => Outcome::skipped(reason, detail),
            ScenarioVerdict::Checkpointed { step_index } => Outcome::skipped(
                SkipReason::Cancelled,
                format!("cancelled; resumes at step {}", step_index + 1),
            ),
        }
    }
}

/// One scenario execution request.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioRequest<'r> {
    pub item_id: &'r str,
    pub scenario_id: &'r str,
    pub def: &'r ScenarioDef,
    pub skip_if_missing: bool,
}

/// Knobs shared by every scenario in a run.
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    pub default_timeout: Duration,
    pub resource_wait: Duration,
    pub strict_tools: bool,
}

pub struct ScenarioRunner<'a> {
    pub runner: &'a dyn CommandRunner,
    pub tools: &'a dyn ToolLocator,
    pub checkpoints: &'a dyn CheckpointStore,
    pub locks: &'a ResourceLocks,
    pub resources: &'a BTreeMap<String, ResourceDef>,
    pub guidance: &'a BTreeMap<String, String>,
    pub clock: &'a dyn Clock,
    pub settings: ScenarioSettings,
}

enum StepResult {
    Completed(Option<Captured>),
    Failed(FailureDetail),
    Skipped { reason: SkipReason, detail: String },
}

impl ScenarioRunner<'_> {
    /// Run (or resume) a scenario to a terminal state or a checkpoint.
    ///
    /// `Err` is reserved for checkpoint persistence and state machine errors.
    pub fn run(&self, request: ScenarioRequest<'_>, cancel: &CancelToken) -> Result<ScenarioVerdict> {
        let mut machine = ScenarioMachine::new();
        let digest = scenario_digest(request.def)?;

        let Some(_guard) = self
            .locks
            .acquire(&request.def.resources, self.settings.resource_wait)
        else {
            machine.advance(ScenarioState::Skipped)?;
            return Ok(ScenarioVerdict::Skipped {
                reason: SkipReason::ResourceContended,
                detail: format!(
                    "resources {} busy for {}s",
                    request.def.resources.join(", "),
                    self.settings.resource_wait.as_secs()
                ),
            });
        };
        machine.advance(ScenarioState::Running)?;

        if let Some(verdict) = self.probe_resources(&request) {
            return self.finish(&request, &mut machine, verdict);
        }

        let start = self.resume_point(&request, &digest)?;
        for index in start..request.def.steps.len() {
            if cancel.is_cancelled() {
                machine.advance(ScenarioState::Checkpointed)?;
                tracing::info!(
                    item = request.item_id,
                    scenario = request.scenario_id,
                    next_step = index,
                    "scenario cancelled at checkpoint"
                );
                return Ok(ScenarioVerdict::Checkpointed { step_index: index });
            }
            let step = &request.def.steps[index];
            match self.run_step(step) {
                StepResult::Completed(after) => {
                    self.checkpoints.save(&Checkpoint {
                        schema_version: CHECKPOINT_SCHEMA_VERSION,
                        scenario_id: request.scenario_id.to_string(),
                        item_id: request.item_id.to_string(),
                        scenario_digest: digest.clone(),
                        step_index: index + 1,
                        captured_state_after: after.map(|captured| captured.snapshot),
                        updated_at_epoch_ms: self.clock.now_epoch_ms()?,
                    })?;
                    machine.advance(ScenarioState::Checkpointed)?;
                    machine.advance(ScenarioState::Running)?;
                    tracing::debug!(
                        item = request.item_id,
                        step = %step.name,
                        "scenario step passed"
                    );
                }
                StepResult::Failed(detail) => {
                    let verdict = ScenarioVerdict::Failed {
                        step_index: index,
                        step_name: step.name.clone(),
                        detail,
                    };
                    return self.finish(&request, &mut machine, verdict);
                }
                StepResult::Skipped { reason, detail } => {
                    let verdict = ScenarioVerdict::Skipped { reason, detail };
                    return self.finish(&request, &mut machine, verdict);
                }
            }
        }

        let steps_run = request.def.steps.len() - start;
        let verdict = ScenarioVerdict::Passed {
            steps_run,
            resumed_from: (start > 0).then_some(start),
        };
        self.finish(&request, &mut machine, verdict)
    }

    /// Record the terminal state and drop the checkpoint.
    fn finish(
        &self,
        request: &ScenarioRequest<'_>,
        machine: &mut ScenarioMachine,
        verdict: ScenarioVerdict,
    ) -> Result<ScenarioVerdict> {
        let terminal = match &verdict {
            ScenarioVerdict::Passed { .. } => ScenarioState::Passed,
            ScenarioVerdict::Failed { .. } => ScenarioState::Failed,
            ScenarioVerdict::Skipped { .. } => ScenarioState::Skipped,
            ScenarioVerdict::Checkpointed { .. } => ScenarioState::Checkpointed,
        };
        machine.advance(terminal)?;
        if terminal.is_terminal() {
            self.checkpoints
                .delete(request.scenario_id, request.item_id)?;
        }
        Ok(verdict)
    }

    /// Index of the first step to run, honouring a still-valid checkpoint.
    fn resume_point(&self, request: &ScenarioRequest<'_>, digest: &str) -> Result<usize> {
        let Some(checkpoint) = self
            .checkpoints
            .load(request.scenario_id, request.item_id)?
        else {
            return Ok(0);
        };
        let steps = &request.def.steps;
        if checkpoint.scenario_digest != digest
            || checkpoint.step_index == 0
            || checkpoint.step_index > steps.len()
        {
            tracing::warn!(
                item = request.item_id,
                scenario = request.scenario_id,
                "discarding checkpoint for a different scenario definition"
            );
            self.checkpoints
                .delete(request.scenario_id, request.item_id)?;
            return Ok(0);
        }

        let last = &steps[checkpoint.step_index - 1];
        let still_holds = match (&last.capture, &checkpoint.captured_state_after) {
            (Some(command), Some(expected)) => {
                match capture_state(self.runner, command, self.step_timeout(last)) {
                    Ok(current) => current.snapshot.same_state(expected),
                    Err(_) => false,
                }
            }
            (None, None) => true,
            _ => false,
        };
        if !still_holds {
            tracing::warn!(
                item = request.item_id,
                scenario = request.scenario_id,
                step = checkpoint.step_index,
                "checkpointed state no longer holds; restarting scenario"
            );
            self.checkpoints
                .delete(request.scenario_id, request.item_id)?;
            return Ok(0);
        }
        tracing::info!(
            item = request.item_id,
            scenario = request.scenario_id,
            step = checkpoint.step_index,
            "resuming scenario from checkpoint"
        );
        Ok(checkpoint.step_index)
    }

    /// `None` when every declared resource with a probe is present.
    fn probe_resources(&self, request: &ScenarioRequest<'_>) -> Option<ScenarioVerdict> {
        for name in &request.def.resources {
            let Some(probe) = self
                .resources
                .get(name)
                .and_then(|resource| resource.probe.as_deref())
            else {
                continue;
            };
            let present = Invocation::parse(probe, self.settings.default_timeout)
                .and_then(|invocation| self.runner.run(&invocation))
                .map(|output| output.exit_code == Some(0))
                .unwrap_or(false);
            if present {
                continue;
            }
            let detail = format!("resource `{name}` is not available");
            return Some(if request.skip_if_missing {
                ScenarioVerdict::Skipped {
                    reason: SkipReason::ResourceMissing,
                    detail,
                }
            } else {
                ScenarioVerdict::Failed {
                    step_index: 0,
                    step_name: "resources".to_string(),
                    detail: FailureDetail {
                        reason: FailureReason::ResourceMissing,
                        expected: format!("resource `{name}` present"),
                        actual: "probe failed".to_string(),
                    },
                }
            });
        }
        None
    }

    fn step_timeout(&self, step: &StepDef) -> Duration {
        step.timeout_seconds
            .map_or(self.settings.default_timeout, Duration::from_secs)
    }

    fn run_step(&self, step: &StepDef) -> StepResult {
        let timeout = self.step_timeout(step);
        let invocation = match Invocation::parse(&step.invoke, timeout) {
            Ok(invocation) => invocation,
            Err(err) => {
                return StepResult::Failed(FailureDetail {
                    reason: FailureReason::ExecutionError,
                    expected: "a runnable step command".to_string(),
                    actual: format!("{err:#}"),
                })
            }
        };
        let capture = step
            .capture
            .as_deref()
            .map(|command| Invocation::parse(command, timeout))
            .transpose();
        let capture_tools: Vec<String> = match capture {
            Ok(capture) => capture
                .map(|capture| capture.program().to_string())
                .into_iter()
                .collect(),
            Err(err) => {
                return StepResult::Failed(FailureDetail {
                    reason: FailureReason::ExecutionError,
                    expected: "a runnable capture command".to_string(),
                    actual: format!("{err:#}"),
                })
            }
        };
        if let Some(tool) = first_missing_tool(self.tools, invocation.program(), &capture_tools) {
            let guidance = self
                .guidance
                .get(tool)
                .cloned()
                .unwrap_or_else(|| format!("install `{tool}` and ensure it is on PATH"));
            let detail = format!("required tool `{tool}` not found: {guidance}");
            return if self.settings.strict_tools {
                StepResult::Failed(FailureDetail {
                    reason: FailureReason::ToolMissing,
                    expected: format!("`{tool}` on PATH"),
                    actual: detail,
                })
            } else {
                StepResult::Skipped {
                    reason: SkipReason::DependencyMissing,
                    detail,
                }
            };
        }

        let before = match &step.capture {
            Some(command) => match capture_state(self.runner, command, timeout) {
                Ok(captured) => Some(captured),
                Err(detail) => return StepResult::Failed(detail),
            },
            None => None,
        };

        let output = match self.runner.run(&invocation) {
            Ok(output) => output,
            Err(err) => {
                return StepResult::Failed(FailureDetail {
                    reason: FailureReason::ExecutionError,
                    expected: format!("`{}` to start", invocation.command_line()),
                    actual: format!("{err:#}"),
                })
            }
        };
        if output.timed_out {
            return StepResult::Failed(FailureDetail {
                reason: FailureReason::Timeout,
                expected: format!("completion within {}s", timeout.as_secs()),
                actual: format!("killed after {}ms", output.elapsed_ms),
            });
        }
        if output.exit_code != Some(step.expect_exit_code) {
            return StepResult::Failed(FailureDetail {
                reason: FailureReason::AssertionFailed,
                expected: format!("exit code {}", step.expect_exit_code),
                actual: format!("exit code {}", output.exit_code_string()),
            });
        }

        let after = match &step.capture {
            Some(command) => match capture_state(self.runner, command, timeout) {
                Ok(captured) => Some(captured),
                Err(detail) => return StepResult::Failed(detail),
            },
            None => None,
        };
        match assert_transition(&step.expect, before.as_ref(), after.as_ref()) {
            Ok(()) => StepResult::Completed(after),
            Err(detail) => StepResult::Failed(detail),
        }
    }
}

#[cfg(test)]
#[path = "scenario_tests.rs"]
mod tests;
