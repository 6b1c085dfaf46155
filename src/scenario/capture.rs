//! Before/after state capture and transition assertions.
use crate::check::{bounded_snippet, CommandRunner, FailureDetail, Invocation};
use crate::outcome::FailureReason;
use crate::registry::StateTransition;
use crate::util::sha256_hex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const EXCERPT_LINES: usize = 10;
const EXCERPT_BYTES: usize = 1_024;

/// Observed state of the system under test, as reported by a probe command.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// sha256 of the probe's stdout.
    pub digest: String,
    pub excerpt: String,
}

impl StateSnapshot {
    /// Two snapshots describe the same state when exit code and output agree.
    pub fn same_state(&self, other: &StateSnapshot) -> bool {
        self.exit_code == other.exit_code && self.digest == other.digest
    }
}

/// A snapshot plus the full probe output used for assertions.
#[derive(Debug, Clone)]
pub struct Captured {
    pub snapshot: StateSnapshot,
    pub stdout: String,
}

/// Run a capture probe.
pub fn capture_state(
    runner: &dyn CommandRunner,
    command: &str,
    timeout: Duration,
) -> Result<Captured, FailureDetail> {
    let invocation = Invocation::parse(command, timeout).map_err(|err| FailureDetail {
        reason: FailureReason::ExecutionError,
        expected: "a runnable capture command".to_string(),
        actual: format!("{err:#}"),
    })?;
    let output = runner.run(&invocation).map_err(|err| FailureDetail {
        reason: FailureReason::ExecutionError,
        expected: format!("capture `{}` to start", invocation.command_line()),
        actual: format!("{err:#}"),
    })?;
    if output.timed_out {
        return Err(FailureDetail {
            reason: FailureReason::Timeout,
            expected: format!("capture within {}s", timeout.as_secs()),
            actual: format!("capture `{}` timed out", invocation.command_line()),
        });
    }
    Ok(Captured {
        snapshot: StateSnapshot {
            exit_code: output.exit_code,
            digest: sha256_hex(output.stdout.as_bytes()),
            excerpt: bounded_snippet(&output.stdout, EXCERPT_LINES, EXCERPT_BYTES),
        },
        stdout: output.stdout,
    })
}

/// Check the expected transition between two captures.
pub fn assert_transition(
    expect: &StateTransition,
    before: Option<&Captured>,
    after: Option<&Captured>,
) -> Result<(), FailureDetail> {
    let mismatch = |expected: String, actual: String| FailureDetail {
        reason: FailureReason::AssertionFailed,
        expected,
        actual,
    };
    match expect {
        StateTransition::Any => Ok(()),
        StateTransition::Changed | StateTransition::Unchanged => {
            let (Some(before), Some(after)) = (before, after) else {
                return Err(mismatch(
                    "before and after captures".to_string(),
                    "no capture configured".to_string(),
                ));
            };
            let same = before.snapshot.same_state(&after.snapshot);
            match (expect, same) {
                (StateTransition::Changed, true) => Err(mismatch(
                    "state to change".to_string(),
                    format!("unchanged: {}", after.snapshot.excerpt.trim_end()),
                )),
                (StateTransition::Unchanged, false) => Err(mismatch(
                    format!("state to stay {}", before.snapshot.excerpt.trim_end()),
                    after.snapshot.excerpt.trim_end().to_string(),
                )),
                _ => Ok(()),
            }
        }
        StateTransition::AfterMatches { pattern } => {
            let Some(after) = after else {
                return Err(mismatch(
                    format!("after state matching {pattern:?}"),
                    "no capture configured".to_string(),
                ));
            };
            let regex = Regex::new(pattern).map_err(|err| {
                mismatch(format!("valid regex {pattern:?}"), err.to_string())
            })?;
            if regex.is_match(&after.stdout) {
                Ok(())
            } else {
                Err(mismatch(
                    format!("after state matching {pattern:?}"),
                    after.snapshot.excerpt.trim_end().to_string(),
                ))
            }
        }
        StateTransition::AfterEquals { value } => {
            let Some(after) = after else {
                return Err(mismatch(
                    format!("after state {value:?}"),
                    "no capture configured".to_string(),
                ));
            };
            if after.stdout.trim() == value {
                Ok(())
            } else {
                Err(mismatch(
                    format!("after state {value:?}"),
                    after.snapshot.excerpt.trim_end().to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(stdout: &str) -> Captured {
        Captured {
            snapshot: StateSnapshot {
                exit_code: Some(0),
                digest: sha256_hex(stdout.as_bytes()),
                excerpt: stdout.to_string(),
            },
            stdout: stdout.to_string(),
        }
    }

    #[test]
    fn changed_and_unchanged_compare_digests() {
        let a = captured("abc\n");
        let b = captured("xyz\n");
        assert!(assert_transition(&StateTransition::Changed, Some(&a), Some(&b)).is_ok());
        assert!(assert_transition(&StateTransition::Changed, Some(&a), Some(&a)).is_err());
        assert!(assert_transition(&StateTransition::Unchanged, Some(&a), Some(&a)).is_ok());
        let err = assert_transition(&StateTransition::Unchanged, Some(&a), Some(&b))
            .expect_err("changed");
        assert_eq!(err.actual, "xyz");
    }

    #[test]
    fn after_predicates_use_full_output() {
        let after = captured("status: restored\n");
        let matches = StateTransition::AfterMatches {
            pattern: "restored$".to_string(),
        };
        assert!(assert_transition(&matches, None, Some(&after)).is_ok());
        let equals = StateTransition::AfterEquals {
            value: "status: restored".to_string(),
        };
        assert!(assert_transition(&equals, None, Some(&after)).is_ok());
        assert!(assert_transition(&equals, None, None).is_err());
        assert!(assert_transition(&StateTransition::Any, None, None).is_ok());
    }
}
