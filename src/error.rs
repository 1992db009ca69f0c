//! Engine Error Types

use thiserror::Error;

/// Errors raised by the compiler and the evaluator.
///
/// Predicate evaluation itself never errors: a predicate whose operand type
/// does not match the event value evaluates to false. Callers distinguish an
/// empty match result from a failure by the error kind.
#[derive(Error, Debug)]
pub enum HeliosError {
    /// A rule definition failed schema validation
    #[error("invalid rule '{rule_code}': {detail}")]
    InvalidRule { rule_code: String, detail: String },

    /// An internal invariant was breached while building the model
    #[error("model integrity violation in stage {stage}: {detail}")]
    ModelIntegrity { stage: &'static str, detail: String },

    /// The event was rejected before any evaluation work
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A cache backend failed; the evaluator recovers by treating the
    /// lookup as a miss
    #[error("cache backend error: {0}")]
    CacheBackend(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error while reading rules or events
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while reading rule or event files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for HeliosError {
    fn from(err: figment::Error) -> Self {
        HeliosError::Config(err.to_string())
    }
}

impl HeliosError {
    /// Build an `InvalidRule` error for the named rule.
    pub fn invalid_rule(rule_code: impl Into<String>, detail: impl Into<String>) -> Self {
        HeliosError::InvalidRule {
            rule_code: rule_code.into(),
            detail: detail.into(),
        }
    }

    /// Build a `ModelIntegrity` error for the named pipeline stage.
    pub fn integrity(stage: &'static str, detail: impl Into<String>) -> Self {
        HeliosError::ModelIntegrity {
            stage,
            detail: detail.into(),
        }
    }
}

/// Result type for engine operations
pub type HeliosResult<T> = Result<T, HeliosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rule_names_the_rule() {
        let err = HeliosError::invalid_rule("R42", "conditions must not be empty");
        assert_eq!(
            err.to_string(),
            "invalid rule 'R42': conditions must not be empty"
        );
    }

    #[test]
    fn test_integrity_names_the_stage() {
        let err = HeliosError::integrity("VALIDATE", "combination 3 has zero predicates");
        assert!(err.to_string().contains("VALIDATE"));
        assert!(err.to_string().contains("combination 3"));
    }
}
