//! The map facade: chunking, error policy, progress and collection over any backend.

use std::fmt;

use indicatif::ProgressBar;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ExecutionConfig;
use crate::error_handling::{ParMapError, Result, TaskFailure};

use super::collector::{ResultCollector, ResultSequence};
use super::policy::{Decision, ErrorPolicy};
use super::process_pool::{ProcessBackend, RemoteTask, WorkerCommand};
use super::progress::ProgressReporter;
use super::thread_pool::ThreadBackend;
use super::{chunk_tasks, ExecutionBackend, Flow, TaskOutcome};

/// Apply `task` to every item on a pool of worker processes started from the current
/// executable. The executable must register `task` and call `run_worker_if_requested`.
pub fn parallel_map<I, O>(
    task: &RemoteTask<I, O>,
    items: Vec<I>,
    config: &ExecutionConfig,
) -> Result<ResultSequence<O>>
where
    I: Serialize,
    O: DeserializeOwned + Send,
{
    config.validate()?;
    if items.is_empty() {
        return Ok(ResultSequence::empty(config.completion_mode));
    }
    let backend = ProcessBackend::new(WorkerCommand::current_exe()?, task.clone());
    ParallelMap::new(config.clone()).run(&backend, items)
}

/// Apply `f` to every item on a pool of worker threads.
pub fn threaded_map<I, O, E, F>(f: F, items: Vec<I>, config: &ExecutionConfig) -> Result<ResultSequence<O>>
where
    I: fmt::Debug + Send + 'static,
    O: Send + 'static,
    E: fmt::Display + 'static,
    F: Fn(&I) -> std::result::Result<O, E> + Send + Sync + 'static,
{
    ParallelMap::new(config.clone()).run(&ThreadBackend::new(f), items)
}

/// Parallel map with a fixed configuration, reusable across backends and calls.
/// Each `run` builds and tears down its own pool.
#[derive(Clone, Debug, Default)]
pub struct ParallelMap {
    config: ExecutionConfig,
    bar: Option<ProgressBar>,
}

impl ParallelMap {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config, bar: None }
    }

    /// Report progress into `bar` (e.g. one inside a `MultiProgress`) whether or not
    /// `show_progress` is set. Each run resets it to zero with the run's task count as length.
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.bar = Some(bar);
        self
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    fn progress(&self, total: usize) -> ProgressReporter {
        match &self.bar {
            Some(bar) => {
                bar.set_length(total as u64);
                bar.set_position(0);
                ProgressReporter::with_bar(bar.clone())
            }
            None => ProgressReporter::new(total, self.config.show_progress),
        }
    }

    /// Run every item through `backend` and collect the results.
    pub fn run<I, O, B>(&self, backend: &B, items: Vec<I>) -> Result<ResultSequence<O>>
    where
        B: ExecutionBackend<I, O> + ?Sized,
    {
        self.config.validate()?;
        if items.is_empty() {
            return Ok(ResultSequence::empty(self.config.completion_mode));
        }

        let total = items.len();
        let chunks = chunk_tasks(items, self.config.effective_chunk_size());
        debug!(
            "parallel map on {}: {} task(s) in {} chunk(s), {:?}, {:?}",
            backend.name(),
            total,
            chunks.len(),
            self.config.completion_mode,
            self.config.on_error
        );

        let policy = ErrorPolicy::new(self.config.on_error);
        let mut collector = ResultCollector::new(total, self.config.completion_mode);
        let mut progress = self.progress(total);
        let mut first_failure: Option<TaskFailure> = None;
        let mut internal: Option<ParMapError> = None;

        let submitted = backend.submit_batch(chunks, self.config.worker_count, &mut |outcome| {
            let recorded = match (policy.decide(&outcome), outcome) {
                (Decision::Keep, TaskOutcome::Success { index, value }) => {
                    collector.record_success(index, value)
                }
                (Decision::Substitute, TaskOutcome::Failure(failure)) => {
                    warn!(
                        "task {} failed on input {}: {} (substituted null)",
                        failure.index, failure.input, failure.message
                    );
                    collector.record_failure(failure)
                }
                (_, TaskOutcome::Failure(failure)) => {
                    debug!("task {} failed, aborting batch: {}", failure.index, failure.message);
                    first_failure = Some(failure);
                    return Flow::Abort;
                }
                (_, TaskOutcome::Success { index, .. }) => {
                    Err(ParMapError::UnexpectedOutcome { index })
                }
            };
            match recorded {
                Ok(()) => {
                    progress.tick();
                    Flow::Continue
                }
                Err(e) => {
                    internal = Some(e);
                    Flow::Abort
                }
            }
        });
        progress.finish();

        submitted?;
        if let Some(failure) = first_failure {
            return Err(ParMapError::Task(failure));
        }
        if let Some(e) = internal {
            return Err(e);
        }
        collector.finalize()
    }
}
