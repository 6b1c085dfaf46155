//! Per-item outcome taxonomy shared by the executor, scenario runner, cache
//! and run report.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an executed item did not pass.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    AssertionFailed,
    Timeout,
    ExecutionError,
    ToolMissing,
    ResourceMissing,
}

impl FailureReason {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::AssertionFailed => "assertion_failed",
            FailureReason::Timeout => "timeout",
            FailureReason::ExecutionError => "execution_error",
            FailureReason::ToolMissing => "tool_missing",
            FailureReason::ResourceMissing => "resource_missing",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item was not executed (or not to completion).
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DependencyUnmet,
    DependencyMissing,
    ResourceContended,
    ResourceMissing,
    CycleDetected,
    ManualOnly,
    NoCheck,
    CapabilityUndeclared,
    Cancelled,
}

impl SkipReason {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::DependencyUnmet => "dependency_unmet",
            SkipReason::DependencyMissing => "dependency_missing",
            SkipReason::ResourceContended => "resource_contended",
            SkipReason::ResourceMissing => "resource_missing",
            SkipReason::CycleDetected => "cycle_detected",
            SkipReason::ManualOnly => "manual_only",
            SkipReason::NoCheck => "no_check",
            SkipReason::CapabilityUndeclared => "capability_undeclared",
            SkipReason::Cancelled => "cancelled",
        }
    }

    /// Skips caused by the environment rather than by the registry itself.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SkipReason::DependencyUnmet
                | SkipReason::DependencyMissing
                | SkipReason::ResourceContended
                | SkipReason::ResourceMissing
                | SkipReason::Cancelled
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one item in a run. Every item ends in exactly one.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Failed {
        reason: FailureReason,
        detail: String,
    },
    Skipped {
        reason: SkipReason,
        detail: String,
        /// Offending item id for `dependency_unmet`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blocked_by: Option<String>,
    },
    Ignored {
        reason: String,
    },
}

impl Outcome {
    pub fn passed() -> Self {
        Outcome::Passed { detail: None }
    }

    pub fn failed(reason: FailureReason, detail: impl Into<String>) -> Self {
        Outcome::Failed {
            reason,
            detail: detail.into(),
        }
    }

    pub fn skipped(reason: SkipReason, detail: impl Into<String>) -> Self {
        Outcome::Skipped {
            reason,
            detail: detail.into(),
            blocked_by: None,
        }
    }

    pub fn dependency_unmet(dependency: &str) -> Self {
        Outcome::Skipped {
            reason: SkipReason::DependencyUnmet,
            detail: format!("dependency {dependency} is not satisfied"),
            blocked_by: Some(dependency.to_string()),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed { .. })
    }

    /// Passed and failed outcomes are definitive and may be cached.
    pub fn is_definitive(&self) -> bool {
        matches!(self, Outcome::Passed { .. } | Outcome::Failed { .. })
    }

    pub fn status_str(&self) -> &'static str {
        match self {
            Outcome::Passed { .. } => "passed",
            Outcome::Failed { .. } => "failed",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Ignored { .. } => "ignored",
        }
    }

    /// Reason code shown next to the status.
    pub fn reason_str(&self) -> Option<&str> {
        match self {
            Outcome::Passed { .. } => None,
            Outcome::Failed { reason, .. } => Some(reason.as_str()),
            Outcome::Skipped { reason, .. } => Some(reason.as_str()),
            Outcome::Ignored { .. } => Some("ignored"),
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Outcome::Passed { detail } => detail.as_deref(),
            Outcome::Failed { detail, .. } | Outcome::Skipped { detail, .. } => Some(detail),
            Outcome::Ignored { reason } => Some(reason),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason_str() {
            Some(reason) => write!(f, "{}: {reason}", self.status_str()),
            None => f.write_str(self.status_str()),
        }
    }
}
