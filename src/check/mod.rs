//! Single-assertion check execution.
//!
//! A check is structured data: a command, an expected exit code, and an
//! optional output predicate. The executor never mutates host state beyond
//! invoking the named collaborator.
use crate::outcome::{FailureReason, Outcome, SkipReason};
use crate::registry::Assertion;
use std::collections::BTreeMap;
use std::time::Duration;

mod matcher;
mod runner;
mod tools;

pub use matcher::{apply_matcher, parse_json_path};
pub use runner::{
    bounded_snippet, CommandRunner, Invocation, ProcessOutput, ShellRunner,
};
pub use tools::{first_missing_tool, PathLocator, ToolLocator};

#[cfg(test)]
pub(crate) use runner::scripted::ScriptedRunner;

const STDERR_EXCERPT_BYTES: usize = 512;

/// Why a check did not pass, with expected vs actual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetail {
    pub reason: FailureReason,
    pub expected: String,
    pub actual: String,
}

impl FailureDetail {
    pub fn summary(&self) -> String {
        format!("expected {}; got {}", self.expected, self.actual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Failed(FailureDetail),
    ErrorMissingTool { tool: String, guidance: String },
}

impl CheckOutcome {
    /// Map to an item outcome. A missing tool is never a pass: strict runs
    /// fail it, others skip it as an unavailable dependency.
    pub fn into_outcome(self, strict_tools: bool) -> Outcome {
        match self {
            CheckOutcome::Passed => Outcome::passed(),
            CheckOutcome::Failed(detail) => Outcome::failed(detail.reason, detail.summary()),
            CheckOutcome::ErrorMissingTool { tool, guidance } => {
                let detail = format!("required tool `{tool}` not found: {guidance}");
                if strict_tools {
                    Outcome::failed(FailureReason::ToolMissing, detail)
                } else {
                    Outcome::skipped(SkipReason::DependencyMissing, detail)
                }
            }
        }
    }
}

pub struct CheckExecutor<'a> {
    runner: &'a dyn CommandRunner,
    tools: &'a dyn ToolLocator,
    guidance: &'a BTreeMap<String, String>,
    default_timeout: Duration,
}

impl<'a> CheckExecutor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        tools: &'a dyn ToolLocator,
        guidance: &'a BTreeMap<String, String>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            tools,
            guidance,
            default_timeout,
        }
    }

    /// Installation guidance for a missing tool.
    pub fn guidance_for(&self, tool: &str) -> String {
        self.guidance
            .get(tool)
            .cloned()
            .unwrap_or_else(|| format!("install `{tool}` and ensure it is on PATH"))
    }

    pub fn timeout_for(&self, seconds: Option<u64>) -> Duration {
        seconds.map_or(self.default_timeout, Duration::from_secs)
    }

    /// Run one assertion and classify the result.
    pub fn execute(&self, assertion: &Assertion) -> CheckOutcome {
        let timeout = self.timeout_for(assertion.timeout_seconds);
        let invocation = match Invocation::parse(&assertion.command, timeout) {
            Ok(invocation) => invocation.with_env(&assertion.env),
            Err(err) => {
                return CheckOutcome::Failed(FailureDetail {
                    reason: FailureReason::ExecutionError,
                    expected: "a runnable command".to_string(),
                    actual: format!("{err:#}"),
                })
            }
        };
        if let Some(tool) =
            first_missing_tool(self.tools, invocation.program(), &assertion.requires_tools)
        {
            return CheckOutcome::ErrorMissingTool {
                tool: tool.to_string(),
                guidance: self.guidance_for(tool),
            };
        }

        let output = match self.runner.run(&invocation) {
            Ok(output) => output,
            Err(err) => {
                return CheckOutcome::Failed(FailureDetail {
                    reason: FailureReason::ExecutionError,
                    expected: format!("`{}` to start", invocation.command_line()),
                    actual: format!("{err:#}"),
                })
            }
        };
        tracing::debug!(
            command = %invocation.command_line(),
            exit_code = ?output.exit_code,
            elapsed_ms = output.elapsed_ms as u64,
            "check executed"
        );
        classify(assertion, &invocation, &output)
    }
}

fn classify(assertion: &Assertion, invocation: &Invocation, output: &ProcessOutput) -> CheckOutcome {
    if output.timed_out {
        return CheckOutcome::Failed(FailureDetail {
            reason: FailureReason::Timeout,
            expected: format!("completion within {}s", invocation.timeout.as_secs()),
            actual: format!("killed after {}ms", output.elapsed_ms),
        });
    }
    if output.exit_code != Some(assertion.expect_exit_code) {
        let stderr = bounded_snippet(output.stderr.trim(), 5, STDERR_EXCERPT_BYTES);
        let actual = if stderr.is_empty() {
            format!("exit code {}", output.exit_code_string())
        } else {
            format!("exit code {} (stderr: {stderr})", output.exit_code_string())
        };
        return CheckOutcome::Failed(FailureDetail {
            reason: FailureReason::AssertionFailed,
            expected: format!("exit code {}", assertion.expect_exit_code),
            actual,
        });
    }
    if let Some(matcher) = &assertion.output {
        if let Err(mismatch) = apply_matcher(matcher, output) {
            return CheckOutcome::Failed(FailureDetail {
                reason: FailureReason::AssertionFailed,
                expected: mismatch.expected,
                actual: mismatch.actual,
            });
        }
    }
    CheckOutcome::Passed
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
