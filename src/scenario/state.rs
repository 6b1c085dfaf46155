//! Scenario lifecycle state machine.
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Pending,
    Running,
    Checkpointed,
    Passed,
    Failed,
    Skipped,
}

impl ScenarioState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioState::Pending => "pending",
            ScenarioState::Running => "running",
            ScenarioState::Checkpointed => "checkpointed",
            ScenarioState::Passed => "passed",
            ScenarioState::Failed => "failed",
            ScenarioState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScenarioState::Passed | ScenarioState::Failed | ScenarioState::Skipped
        )
    }

    /// `Pending → Running → (Checkpointed ⇄ Running) → Passed | Failed | Skipped`.
    /// A scenario that never starts (resource contention) may go straight
    /// from `Pending` to `Skipped`.
    pub fn can_transition_to(&self, next: ScenarioState) -> bool {
        use ScenarioState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Checkpointed)
                | (Checkpointed, Running)
                | (Running, Passed)
                | (Running, Failed)
                | (Running, Skipped)
        )
    }
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one scenario's state and rejects illegal transitions.
#[derive(Debug, Clone)]
pub struct ScenarioMachine {
    state: ScenarioState,
    trail: Vec<ScenarioState>,
}

impl Default for ScenarioMachine {
    fn default() -> Self {
        Self {
            state: ScenarioState::Pending,
            trail: vec![ScenarioState::Pending],
        }
    }
}

impl ScenarioMachine {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn state(&self) -> ScenarioState {
        self.state
    }

    /// Every state visited, in order.
    #[cfg(test)]
    pub fn trail(&self) -> &[ScenarioState] {
        &self.trail
    }

    pub fn advance(&mut self, next: ScenarioState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.trail.push(next);
        Ok(())
    }
}
