//! Per-task failure policy.

use crate::config::OnError;

use super::TaskOutcome;

/// What the facade does with one outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Success: store the value
    Keep,
    /// Failure: store a null marker, record the failure, continue
    Substitute,
    /// Failure: stop collecting, drain the pool, return this failure
    Abort,
}

/// Pure decision from the configured `on_error` and the outcome tag. Never retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorPolicy {
    on_error: OnError,
}

impl ErrorPolicy {
    pub fn new(on_error: OnError) -> Self {
        Self { on_error }
    }

    pub fn decide<O>(&self, outcome: &TaskOutcome<O>) -> Decision {
        match (outcome, self.on_error) {
            (TaskOutcome::Success { .. }, _) => Decision::Keep,
            (TaskOutcome::Failure(_), OnError::SubstituteNull) => Decision::Substitute,
            (TaskOutcome::Failure(_), OnError::Propagate) => Decision::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskFailure;

    fn failed() -> TaskOutcome<u32> {
        TaskOutcome::Failure(TaskFailure {
            index: 0,
            input: "0".to_string(),
            message: "boom".to_string(),
        })
    }

    #[test]
    fn test_success_always_kept() {
        let ok = TaskOutcome::Success { index: 0, value: 1u32 };
        assert_eq!(ErrorPolicy::new(OnError::Propagate).decide(&ok), Decision::Keep);
        assert_eq!(ErrorPolicy::new(OnError::SubstituteNull).decide(&ok), Decision::Keep);
    }

    #[test]
    fn test_failure_follows_config() {
        assert_eq!(ErrorPolicy::new(OnError::Propagate).decide(&failed()), Decision::Abort);
        assert_eq!(
            ErrorPolicy::new(OnError::SubstituteNull).decide(&failed()),
            Decision::Substitute
        );
    }
}
