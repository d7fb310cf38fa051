//! Parallel task execution: one map contract over two pool backends.
//!
//! Threads share memory and suit blocking or I/O-bound work; processes are isolated and
//! suit CPU-bound work. Both are built fresh per call and fully drained before it returns.

mod collector;
mod parallel;
mod policy;
mod process_pool;
mod progress;
mod protocol;
mod thread_pool;
mod worker;

pub use collector::{ResultCollector, ResultSequence};
pub use parallel::{parallel_map, threaded_map, ParallelMap};
pub use policy::{Decision, ErrorPolicy};
pub use process_pool::{ProcessBackend, RemoteTask, WorkerCommand};
pub use progress::ProgressReporter;
pub use protocol::{FRAME_PREFIX, WORKER_FLAG};
pub use thread_pool::ThreadBackend;
pub use worker::{run_worker_if_requested, TaskRegistry};

use crate::error_handling::{Result, TaskFailure};

/// One unit of work: an input and its position in the input sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task<I> {
    pub index: usize,
    pub input: I,
}

/// Contiguous run of tasks handed to one worker at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk<I> {
    pub tasks: Vec<Task<I>>,
}

impl<I> Chunk<I> {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Result of running one task, tagged with the task's index.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome<O> {
    Success { index: usize, value: O },
    Failure(TaskFailure),
}

impl<O> TaskOutcome<O> {
    pub fn index(&self) -> usize {
        match self {
            TaskOutcome::Success { index, .. } => *index,
            TaskOutcome::Failure(failure) => failure.index,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failure(_))
    }
}

/// Answer of the outcome sink: keep feeding outcomes, or stop starting new work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Abort,
}

/// Execution substrate a parallel map runs on.
///
/// Implementations must report every task of every started chunk exactly once, stop
/// starting chunks after the sink answers [`Flow::Abort`], and release all workers
/// before returning, on success and on error alike.
pub trait ExecutionBackend<I, O> {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Run all chunks on at most `worker_count` workers, feeding outcomes to `sink`
    /// on the calling thread as they arrive.
    fn submit_batch(
        &self,
        chunks: Vec<Chunk<I>>,
        worker_count: usize,
        sink: &mut dyn FnMut(TaskOutcome<O>) -> Flow,
    ) -> Result<()>;
}

/// Split items into indexed chunks of at most `chunk_size` tasks.
pub fn chunk_tasks<I>(items: Vec<I>, chunk_size: usize) -> Vec<Chunk<I>> {
    let size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);

    for (index, input) in items.into_iter().enumerate() {
        current.push(Task { index, input });
        if current.len() == size {
            let tasks = std::mem::replace(&mut current, Vec::with_capacity(size));
            chunks.push(Chunk { tasks });
        }
    }
    if !current.is_empty() {
        chunks.push(Chunk { tasks: current });
    }

    chunks
}
