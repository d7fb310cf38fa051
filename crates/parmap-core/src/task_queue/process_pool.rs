//! Process backend: isolated worker processes fed chunks over stdin/stdout.
//!
//! Each worker slot is a dispatcher thread owning one child process. A dispatcher pulls the
//! next chunk from a shared queue, writes it to its child and reads one response line per
//! task. A child that dies mid-chunk fails its unanswered tasks and is replaced on the
//! next chunk; its siblings never notice.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::BufReader;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error_handling::{utils, ParMapError, Result, TaskFailure};

use super::protocol::{
    read_message, write_message, ChunkRequest, Handshake, TaskResponse, WireOutcome, WireTask,
    WORKER_FLAG,
};
use super::{Chunk, ExecutionBackend, Flow, TaskOutcome};

/// How to start a worker process: a worker-host program plus any leading arguments.
/// The worker flag and task name are appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable, which must call `run_worker_if_requested` early in `main`.
    pub fn current_exe() -> Result<Self> {
        let program =
            std::env::current_exe().map_err(|e| utils::worker_error("locate current executable", e))?;
        Ok(Self::new(program))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn command(&self, task: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(WORKER_FLAG)
            .arg(task)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        command
    }
}

/// Typed handle to a function registered in the worker host's `TaskRegistry`.
pub struct RemoteTask<I, O> {
    name: String,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> RemoteTask<I, O> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<I, O> Clone for RemoteTask<I, O> {
    fn clone(&self) -> Self {
        Self::new(&self.name)
    }
}

/// Runs a registered task on a pool of worker processes. Inputs, outputs and errors
/// cross the process boundary as JSON, so only serializable payloads are accepted.
pub struct ProcessBackend<I, O> {
    command: WorkerCommand,
    task: RemoteTask<I, O>,
}

impl<I, O> ProcessBackend<I, O> {
    pub fn new(command: WorkerCommand, task: RemoteTask<I, O>) -> Self {
        Self { command, task }
    }
}

enum Event<O> {
    Outcome(TaskOutcome<O>),
    Fatal(ParMapError),
}

impl<I, O> ExecutionBackend<I, O> for ProcessBackend<I, O>
where
    I: Serialize,
    O: DeserializeOwned + Send,
{
    fn name(&self) -> &'static str {
        "processes"
    }

    fn submit_batch(
        &self,
        chunks: Vec<Chunk<I>>,
        worker_count: usize,
        sink: &mut dyn FnMut(TaskOutcome<O>) -> Flow,
    ) -> Result<()> {
        // Everything is encoded up front: an unserializable input fails before any spawn.
        let requests = chunks
            .into_iter()
            .map(encode_chunk)
            .collect::<Result<VecDeque<_>>>()?;
        let workers = worker_count.min(requests.len()).max(1);
        debug!(
            "process pool: {} worker(s), {} chunk(s), task {}",
            workers,
            requests.len(),
            self.task.name()
        );

        let queue = Mutex::new(requests);
        let stop = AtomicBool::new(false);
        let mut fatal: Option<ParMapError> = None;

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Event<O>>();
            for slot in 0..workers {
                let dispatcher = Dispatcher {
                    slot,
                    command: &self.command,
                    task: self.task.name(),
                    queue: &queue,
                    stop: &stop,
                    tx: tx.clone(),
                };
                let spawned = thread::Builder::new()
                    .name(format!("parmap-dispatch-{}", slot))
                    .spawn_scoped(scope, move || dispatcher.run());
                if let Err(e) = spawned {
                    stop.store(true, Ordering::SeqCst);
                    fatal = Some(utils::worker_error("spawn dispatcher thread", e));
                    break;
                }
            }
            drop(tx);

            // Runs until every dispatcher has exited, so it doubles as the drain.
            let mut aborted = false;
            for event in rx {
                match event {
                    Event::Outcome(outcome) => {
                        if !aborted && fatal.is_none() && sink(outcome) == Flow::Abort {
                            aborted = true;
                            stop.store(true, Ordering::SeqCst);
                            debug!("process pool: abort requested, draining in-flight chunks");
                        }
                    }
                    Event::Fatal(e) => {
                        stop.store(true, Ordering::SeqCst);
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                    }
                }
            }
        });

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn encode_chunk<I: Serialize>(chunk: Chunk<I>) -> Result<ChunkRequest> {
    let tasks = chunk
        .tasks
        .into_iter()
        .map(|task| {
            serde_json::to_value(&task.input)
                .map(|input| WireTask {
                    index: task.index,
                    input,
                })
                .map_err(|e| ParMapError::Serialization {
                    operation: format!("encode input of task {}", task.index),
                    detail: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ChunkRequest { tasks })
}

struct Dispatcher<'a, O> {
    slot: usize,
    command: &'a WorkerCommand,
    task: &'a str,
    queue: &'a Mutex<VecDeque<ChunkRequest>>,
    stop: &'a AtomicBool,
    tx: Sender<Event<O>>,
}

impl<O: DeserializeOwned> Dispatcher<'_, O> {
    fn run(self) {
        let mut worker: Option<WorkerProcess> = None;

        while !self.stop.load(Ordering::SeqCst) {
            let Some(request) = self.next_chunk() else {
                break;
            };

            if worker.is_none() {
                match WorkerProcess::spawn(self.command, self.task) {
                    Ok(process) => {
                        debug!("process pool: slot {} started worker pid {}", self.slot, process.pid);
                        worker = Some(process);
                    }
                    Err(e) => {
                        self.fail(e);
                        break;
                    }
                }
            }
            let Some(process) = worker.as_mut() else {
                break;
            };

            let result = process.run_chunk(&request, |task, outcome| self.forward(task, outcome));
            if let Err(died) = result {
                warn!(
                    "process pool: worker pid {} lost mid-chunk ({}); failing {} task(s) and replacing it",
                    process.pid,
                    died.detail,
                    request.tasks.len() - died.answered
                );
                for task in &request.tasks[died.answered..] {
                    let failure = TaskFailure {
                        index: task.index,
                        input: task.input.to_string(),
                        message: format!("worker process exited unexpectedly: {}", died.detail),
                    };
                    let _ = self.tx.send(Event::Outcome(TaskOutcome::Failure(failure)));
                }
                // Dropping kills and reaps the broken child.
                worker = None;
            }
        }

        if let Some(mut process) = worker {
            process.close();
        }
    }

    fn next_chunk(&self) -> Option<ChunkRequest> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn fail(&self, error: ParMapError) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Event::Fatal(error));
    }

    fn forward(&self, task: &WireTask, outcome: WireOutcome) {
        let event = match outcome {
            WireOutcome::Success(value) => match serde_json::from_value::<O>(value) {
                Ok(value) => Event::Outcome(TaskOutcome::Success {
                    index: task.index,
                    value,
                }),
                Err(e) => {
                    self.stop.store(true, Ordering::SeqCst);
                    Event::Fatal(ParMapError::Serialization {
                        operation: format!("decode output of task {}", task.index),
                        detail: e.to_string(),
                    })
                }
            },
            WireOutcome::Failure(message) => Event::Outcome(TaskOutcome::Failure(TaskFailure {
                index: task.index,
                input: task.input.to_string(),
                message,
            })),
            WireOutcome::Serialization(detail) => {
                self.stop.store(true, Ordering::SeqCst);
                Event::Fatal(ParMapError::Serialization {
                    operation: format!("worker payload of task {}", task.index),
                    detail,
                })
            }
        };
        let _ = self.tx.send(event);
    }
}

struct ChunkDied {
    answered: usize,
    detail: String,
}

struct WorkerProcess {
    pid: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    reaped: bool,
}

impl WorkerProcess {
    fn spawn(command: &WorkerCommand, task: &str) -> Result<Self> {
        let program = command.program().display().to_string();
        let mut child = command
            .command(task)
            .spawn()
            .map_err(|e| utils::worker_error("spawn worker", format!("{}: {}", program, e)))?;
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(utils::worker_error("spawn worker", "worker pipes unavailable"));
            }
        };

        let mut worker = Self {
            pid: child.id(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            reaped: false,
        };
        match read_message::<_, Handshake>(&mut worker.stdout) {
            Ok(Some(Handshake::Ready(_))) => Ok(worker),
            Ok(Some(Handshake::UnknownTask(name))) => Err(utils::config_error(
                "task",
                &format!("{} is not registered in worker host {}", name, program),
            )),
            Ok(None) => Err(utils::worker_error(
                "handshake",
                format!("{} exited before answering as a worker host", program),
            )),
            Err(e) => Err(utils::worker_error(
                "handshake",
                format!("{} did not answer as a worker host: {}", program, e),
            )),
        }
    }

    fn run_chunk(
        &mut self,
        request: &ChunkRequest,
        mut on_response: impl FnMut(&WireTask, WireOutcome),
    ) -> std::result::Result<(), ChunkDied> {
        let stdin = self.stdin.as_mut().ok_or_else(|| ChunkDied {
            answered: 0,
            detail: "stdin already closed".to_string(),
        })?;
        write_message(stdin, request).map_err(|e| ChunkDied {
            answered: 0,
            detail: e.to_string(),
        })?;

        for (answered, task) in request.tasks.iter().enumerate() {
            let died = |detail: String| ChunkDied { answered, detail };
            match read_message::<_, TaskResponse>(&mut self.stdout) {
                Ok(Some(response)) if response.index == task.index => {
                    on_response(task, response.outcome)
                }
                Ok(Some(response)) => {
                    return Err(died(format!(
                        "answered task {} while task {} was pending",
                        response.index, task.index
                    )))
                }
                Ok(None) => return Err(died(self.exit_detail())),
                Err(e) => return Err(died(e.to_string())),
            }
        }
        Ok(())
    }

    fn exit_detail(&mut self) -> String {
        match self.child.wait() {
            Ok(status) => {
                self.reaped = true;
                status.to_string()
            }
            Err(e) => e.to_string(),
        }
    }

    /// Close stdin so the worker sees EOF, then reap it.
    fn close(&mut self) {
        self.stdin.take();
        match self.child.wait() {
            Ok(status) => debug!("process pool: worker pid {} finished ({})", self.pid, status),
            Err(e) => warn!("process pool: waiting for worker pid {} failed: {}", self.pid, e),
        }
        self.reaped = true;
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if !self.reaped {
            self.stdin.take();
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
