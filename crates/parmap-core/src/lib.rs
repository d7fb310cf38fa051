//! Core library for parmap: one parallel map contract over a thread pool and a process pool.
//! Used by the CLI binary; any program that registers its tasks can host process workers.

pub mod config;
pub mod error_handling;
pub mod task_queue;

pub use config::{CompletionMode, ExecutionConfig, OnError, DEFAULT_CHUNK_SIZE};
pub use error_handling::{ParMapError, Result, TaskFailure};
pub use task_queue::{
    chunk_tasks, parallel_map, run_worker_if_requested, threaded_map, Chunk, Decision,
    ErrorPolicy, ExecutionBackend, Flow, ParallelMap, ProcessBackend, ProgressReporter,
    RemoteTask, ResultCollector, ResultSequence, Task, TaskOutcome, TaskRegistry, ThreadBackend,
    WorkerCommand, FRAME_PREFIX, WORKER_FLAG,
};
