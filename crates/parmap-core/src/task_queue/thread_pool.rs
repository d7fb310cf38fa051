//! Thread backend: a dedicated rayon pool per batch, joined before returning.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use log::debug;
use rayon::ThreadPoolBuilder;

use crate::error_handling::{utils, Result, TaskFailure};

use super::{Chunk, ExecutionBackend, Flow, TaskOutcome};

type SharedFn<I, O> = Arc<dyn Fn(&I) -> std::result::Result<O, String> + Send + Sync>;

/// Runs tasks on worker threads sharing this process's memory. Suited to work dominated
/// by waiting; the worker count may exceed the core count.
///
/// A panicking task becomes a failed outcome, but the process-wide panic hook still runs
/// first, so the default hook prints a "thread 'parmap-worker-N' panicked" message (and a
/// backtrace under `RUST_BACKTRACE`) for each one. Process workers install a silent hook
/// and do not print this. Callers that want quiet threads set their own hook.
pub struct ThreadBackend<I, O> {
    f: SharedFn<I, O>,
    stack_size: Option<usize>,
}

impl<I, O> ThreadBackend<I, O>
where
    I: fmt::Debug + Send + 'static,
    O: Send + 'static,
{
    pub fn new<E, F>(f: F) -> Self
    where
        E: fmt::Display + 'static,
        F: Fn(&I) -> std::result::Result<O, E> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |input: &I| f(input).map_err(|e| e.to_string())),
            stack_size: None,
        }
    }

    /// Stack size for each worker thread
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl<I, O> ExecutionBackend<I, O> for ThreadBackend<I, O>
where
    I: fmt::Debug + Send + 'static,
    O: Send + 'static,
{
    fn name(&self) -> &'static str {
        "threads"
    }

    fn submit_batch(
        &self,
        chunks: Vec<Chunk<I>>,
        worker_count: usize,
        sink: &mut dyn FnMut(TaskOutcome<O>) -> Flow,
    ) -> Result<()> {
        let threads = worker_count.min(chunks.len()).max(1);
        let mut builder = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("parmap-worker-{}", i));
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<TaskOutcome<O>>();
        debug!("thread pool: {} worker(s), {} chunk(s)", threads, chunks.len());

        // Scoped build: every worker thread is joined before this returns.
        builder
            .build_scoped(
                |thread| thread.run(),
                move |pool| {
                    for chunk in chunks {
                        let f = Arc::clone(&self.f);
                        let tx = tx.clone();
                        let cancelled = Arc::clone(&cancelled);
                        pool.spawn(move || run_chunk(f.as_ref(), chunk, &cancelled, &tx));
                    }
                    drop(tx);

                    // The channel closes once every chunk job has finished, so this
                    // loop is also the drain.
                    let mut aborted = false;
                    for outcome in rx {
                        if !aborted && sink(outcome) == Flow::Abort {
                            aborted = true;
                            cancelled.store(true, Ordering::SeqCst);
                            debug!("thread pool: abort requested, draining in-flight tasks");
                        }
                    }
                },
            )
            .map_err(|e| utils::worker_error("build thread pool", e))
    }
}

fn run_chunk<I, O>(
    f: &(dyn Fn(&I) -> std::result::Result<O, String> + Send + Sync),
    chunk: Chunk<I>,
    cancelled: &AtomicBool,
    tx: &Sender<TaskOutcome<O>>,
) where
    I: fmt::Debug,
{
    if cancelled.load(Ordering::SeqCst) {
        return;
    }
    for task in chunk.tasks {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f(&task.input))) {
            Ok(Ok(value)) => TaskOutcome::Success {
                index: task.index,
                value,
            },
            Ok(Err(message)) => TaskOutcome::Failure(TaskFailure {
                index: task.index,
                input: format!("{:?}", task.input),
                message,
            }),
            Err(payload) => TaskOutcome::Failure(TaskFailure {
                index: task.index,
                input: format!("{:?}", task.input),
                message: utils::panic_message(payload.as_ref()),
            }),
        };
        if tx.send(outcome).is_err() {
            return;
        }
    }
}
