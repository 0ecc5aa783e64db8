//! Classification Validator
//!
//! Decides whether a model verdict is safe to act on. Pure and deterministic,
//! so the orchestrator may re-run it freely during replay.

use crate::types::ClassificationResult;

/// `false` when the model flagged an error, otherwise the model's outcome.
pub fn validate(result: &ClassificationResult) -> bool {
    !result.has_error && result.result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn result(has_error: bool, outcome: bool) -> ClassificationResult {
        ClassificationResult {
            device_id: "freezer-01".to_string(),
            timestamp: Utc::now(),
            result: outcome,
            has_error,
            error_message: has_error.then(|| "sensor offline".to_string()),
        }
    }

    #[test]
    fn test_error_flag_always_rejects() {
        assert!(!validate(&result(true, true)));
        assert!(!validate(&result(true, false)));
    }

    #[test]
    fn test_outcome_passes_through_without_error() {
        assert!(validate(&result(false, true)));
        assert!(!validate(&result(false, false)));
    }

    #[test]
    fn test_decision_table() {
        for has_error in [false, true] {
            for outcome in [false, true] {
                let expected = if has_error { false } else { outcome };
                assert_eq!(validate(&result(has_error, outcome)), expected);
            }
        }
    }
}
