use thiserror::Error;

/// Configuration-level failures. These abort the scope they affect; per-item
/// failures are outcomes, never errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("dependency cycle detected between: {}", ids.join(", "))]
    CycleDetected { ids: Vec<String> },

    #[error("malformed registry: {0}")]
    MalformedRegistry(String),

    #[error("unknown item: {0}")]
    UnknownItem(String),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("invalid scenario transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl EngineError {
    /// Process exit code reserved for configuration errors.
    pub const EXIT_CODE: u8 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_participants() {
        let err = EngineError::CycleDetected {
            ids: vec!["a/x".to_string(), "a/y".to_string()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected between: a/x, a/y");
    }
}
