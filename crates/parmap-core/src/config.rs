//! Execution configuration: one immutable snapshot per map call.

use serde::{Deserialize, Serialize};

use crate::error_handling::{utils::config_error, Result};

/// Chunk size used in ordered mode when the caller does not pick one.
pub const DEFAULT_CHUNK_SIZE: usize = 1;

/// How results are laid out in the returned sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Slot i holds the outcome of input i; work is dispatched in chunks
    #[default]
    Ordered,
    /// Every input is its own task; slots are filled in finish order
    AsCompleted,
}

/// What to do with a failed task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Abort the batch and return the first failure
    #[default]
    Propagate,
    /// Put a null marker in the failing slot and keep going
    SubstituteNull,
}

/// Configuration for a parallel map call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Number of workers (threads or processes)
    pub worker_count: usize,
    /// Tasks per dispatched chunk, ordered mode only
    pub chunk_size: usize,
    /// Result layout: input order or finish order
    pub completion_mode: CompletionMode,
    /// Render a progress bar on stderr
    pub show_progress: bool,
    /// Abort on the first failure or substitute a null marker
    pub on_error: OnError,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            chunk_size: DEFAULT_CHUNK_SIZE,
            completion_mode: CompletionMode::Ordered,
            show_progress: false,
            on_error: OnError::Propagate,
        }
    }
}

impl ExecutionConfig {
    /// Defaults: one worker per logical core, ordered, no progress, propagate errors
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of workers
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set tasks per chunk (ordered mode)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set result ordering
    pub fn with_completion_mode(mut self, mode: CompletionMode) -> Self {
        self.completion_mode = mode;
        self
    }

    /// Show or hide the progress bar
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Set failure handling
    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    /// Reject non-positive sizes before any pool is built.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(config_error("worker_count", "must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(config_error("chunk_size", "must be at least 1"));
        }
        Ok(())
    }

    /// Effective tasks per chunk: as-completed mode always submits single tasks.
    pub fn effective_chunk_size(&self) -> usize {
        match self.completion_mode {
            CompletionMode::Ordered => self.chunk_size,
            CompletionMode::AsCompleted => 1,
        }
    }
}
