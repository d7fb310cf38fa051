//! Worker-process side of the process backend: named task registry and serve loop.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error_handling::{utils, Result};

use super::protocol::{
    read_message, write_message, ChunkRequest, Handshake, TaskResponse, WireOutcome, WORKER_FLAG,
};

type ErasedTask = Box<dyn Fn(Value) -> WireOutcome + Send + Sync>;

/// Functions a worker host can run, by name. Processes cannot share closures, so the
/// submitting side refers to a task by the name it was registered under.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, ErasedTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`. Inputs and outputs travel as JSON.
    pub fn register<I, O, E, F>(mut self, name: &str, f: F) -> Self
    where
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        E: fmt::Display + 'static,
        F: Fn(&I) -> std::result::Result<O, E> + Send + Sync + 'static,
    {
        let erased = move |value: Value| -> WireOutcome {
            let input: I = match serde_json::from_value(value) {
                Ok(input) => input,
                Err(e) => return WireOutcome::Serialization(format!("decode input: {}", e)),
            };
            match panic::catch_unwind(AssertUnwindSafe(|| f(&input))) {
                Ok(Ok(output)) => match serde_json::to_value(&output) {
                    Ok(value) => WireOutcome::Success(value),
                    Err(e) => WireOutcome::Serialization(format!("encode output: {}", e)),
                },
                Ok(Err(e)) => WireOutcome::Failure(e.to_string()),
                Err(payload) => WireOutcome::Failure(utils::panic_message(payload.as_ref())),
            }
        };
        self.tasks.insert(name.to_string(), Box::new(erased));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Handshake, then answer chunk requests until `input` reaches EOF.
    pub fn serve<R: BufRead, W: Write>(&self, name: &str, mut input: R, mut output: W) -> Result<()> {
        let task = match self.tasks.get(name) {
            Some(task) => task,
            None => {
                write_message(&mut output, &Handshake::UnknownTask(name.to_string()))?;
                return Ok(());
            }
        };
        write_message(&mut output, &Handshake::Ready(name.to_string()))?;

        while let Some(request) = read_message::<_, ChunkRequest>(&mut input)? {
            debug!("worker {}: chunk of {} task(s)", std::process::id(), request.tasks.len());
            for wire in request.tasks {
                let response = TaskResponse {
                    index: wire.index,
                    outcome: task(wire.input),
                };
                write_message(&mut output, &response)?;
            }
        }
        Ok(())
    }
}

/// If this process was started as a worker, serve until the parent closes stdin and
/// return the exit code. Returns `None` for a normal start.
///
/// Worker hosts call this first thing in `main`.
pub fn run_worker_if_requested(registry: &TaskRegistry) -> Option<i32> {
    let args: Vec<String> = std::env::args().collect();
    let name = worker_task_name(&args)?;

    // Panics are reported to the parent as task failures; keep stderr quiet about them.
    panic::set_hook(Box::new(|_| {}));

    let stdin = io::stdin();
    let stdout = io::stdout();
    match registry.serve(name, stdin.lock(), stdout.lock()) {
        Ok(()) => Some(0),
        Err(e) => {
            error!("worker {} ({}): {}", std::process::id(), name, e);
            Some(1)
        }
    }
}

fn worker_task_name(args: &[String]) -> Option<&str> {
    let pos = args.iter().position(|a| a == WORKER_FLAG)?;
    args.get(pos + 1).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_queue::protocol::FRAME_PREFIX;
    use std::io::Cursor;

    fn registry() -> TaskRegistry {
        TaskRegistry::new()
            .register("square", |x: &i64| Ok::<_, String>(x * x))
            .register("divide_ten_by", |x: &i64| {
                if *x == 0 {
                    Err("division by zero".to_string())
                } else {
                    Ok(10 / x)
                }
            })
            .register("explode", |_: &i64| -> std::result::Result<i64, String> {
                panic!("kaboom")
            })
    }

    fn framed(lines: &[&str]) -> String {
        lines
            .iter()
            .map(|line| format!("{}{}\n", FRAME_PREFIX, line))
            .collect()
    }

    /// Protocol lines with the frame stripped, plus any unframed text.
    fn lines(output: Vec<u8>) -> Vec<String> {
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| line.strip_prefix(FRAME_PREFIX).unwrap_or(line).to_string())
            .collect()
    }

    #[test]
    fn test_serve_answers_each_task() {
        let input = framed(&[
            r#"{"tasks":[{"index":0,"input":3},{"index":1,"input":4}]}"#,
            r#"{"tasks":[{"index":2,"input":"oops"}]}"#,
        ]);
        let mut output = Vec::new();
        registry()
            .serve("square", Cursor::new(input), &mut output)
            .unwrap();

        let lines = self::lines(output);
        assert_eq!(lines[0], r#"{"ready":"square"}"#);
        assert_eq!(lines[1], r#"{"index":0,"outcome":{"success":9}}"#);
        assert_eq!(lines[2], r#"{"index":1,"outcome":{"success":16}}"#);
        assert!(lines[3].contains("serialization"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_serve_reports_errors_and_panics_as_failures() {
        let input = framed(&[r#"{"tasks":[{"index":0,"input":0},{"index":1,"input":5}]}"#]);
        let mut output = Vec::new();
        registry()
            .serve("divide_ten_by", Cursor::new(input), &mut output)
            .unwrap();
        let lines = self::lines(output);
        assert_eq!(lines[1], r#"{"index":0,"outcome":{"failure":"division by zero"}}"#);
        assert_eq!(lines[2], r#"{"index":1,"outcome":{"success":2}}"#);

        let input = framed(&[r#"{"tasks":[{"index":0,"input":1}]}"#]);
        let mut output = Vec::new();
        registry()
            .serve("explode", Cursor::new(input), &mut output)
            .unwrap();
        let lines = self::lines(output);
        assert!(lines[1].contains("task panicked: kaboom"));
    }

    #[test]
    fn test_unknown_task_handshake() {
        let mut output = Vec::new();
        registry()
            .serve("missing", Cursor::new(""), &mut output)
            .unwrap();
        assert_eq!(lines(output), vec![r#"{"unknown_task":"missing"}"#.to_string()]);
    }

    #[test]
    fn test_worker_task_name() {
        let args: Vec<String> = ["parmap", "--parmap-worker", "square"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(worker_task_name(&args), Some("square"));
        assert_eq!(worker_task_name(&args[..1]), None);
        assert_eq!(worker_task_name(&args[..2]), None);
    }

    #[test]
    fn test_registry_names() {
        let registry = registry();
        assert!(registry.contains("square"));
        assert!(!registry.contains("cube"));
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["divide_ten_by", "explode", "square"]
        );
    }
}
