//! Error types for parmap operations.
//! Task failures are data (they flow through the error policy); everything else is fatal.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One task's failure, as reported back to the submitting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Position of the failing task in the input sequence
    pub index: usize,
    /// Rendering of the offending input (Debug for threads, JSON for processes)
    pub input: String,
    /// Error text produced by the task, or the panic message
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} failed on input {}: {}",
            self.index, self.input, self.message
        )
    }
}

/// Main error type for parmap operations
#[derive(Debug, Error)]
pub enum ParMapError {
    /// A task failed and the error policy is to propagate
    #[error("{0}")]
    Task(TaskFailure),
    /// Invalid execution configuration
    #[error("Configuration error: {field} {reason}")]
    Config { field: &'static str, reason: String },
    /// Payload could not cross the process boundary
    #[error("Serialization error in {operation}: {detail}")]
    Serialization { operation: String, detail: String },
    /// Worker process could not be spawned or talked to
    #[error("Worker error in {operation}: {detail}")]
    Worker { operation: String, detail: String },
    /// A backend reported an index twice or one outside the batch
    #[error("Unexpected outcome for task {index}")]
    UnexpectedOutcome { index: usize },
    /// A backend finished without reporting every task
    #[error("Incomplete batch: expected {expected} outcomes, received {received}")]
    Incomplete { expected: usize, received: usize },
}

pub type Result<T> = std::result::Result<T, ParMapError>;

/// Constructors for common error patterns
pub mod utils {
    use super::*;

    pub fn config_error(field: &'static str, reason: &str) -> ParMapError {
        ParMapError::Config {
            field,
            reason: reason.to_string(),
        }
    }

    pub fn serialization_error(operation: &str, source: serde_json::Error) -> ParMapError {
        ParMapError::Serialization {
            operation: operation.to_string(),
            detail: source.to_string(),
        }
    }

    pub fn worker_error(operation: &str, detail: impl fmt::Display) -> ParMapError {
        ParMapError::Worker {
            operation: operation.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Best-effort text of a caught panic payload.
    pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
        if let Some(s) = payload.downcast_ref::<&str>() {
            format!("task panicked: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("task panicked: {}", s)
        } else {
            "task panicked".to_string()
        }
    }
}
