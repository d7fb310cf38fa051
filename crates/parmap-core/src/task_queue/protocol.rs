//! Line-delimited JSON spoken between the process backend and its worker processes.
//!
//! Every protocol line starts with [`FRAME_PREFIX`]. A worker's stdout is shared with
//! whatever its tasks print, so the reading side passes unframed text through to stderr
//! and only decodes framed lines.

use std::io::{self, BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error_handling::{utils, Result};

/// Argument that switches a worker-host binary into worker mode; the next argument is
/// the registered task name.
pub const WORKER_FLAG: &str = "--parmap-worker";

/// Leading bytes of every protocol line (ASCII record separator plus a tag).
pub const FRAME_PREFIX: &str = "\x1eparmap:";

/// First line a worker writes after start-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handshake {
    Ready(String),
    UnknownTask(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireTask {
    pub index: usize,
    pub input: Value,
}

/// One chunk of tasks, sent as a single line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub tasks: Vec<WireTask>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOutcome {
    Success(Value),
    /// The task returned an error or panicked
    Failure(String),
    /// The input or output could not cross the process boundary
    Serialization(String),
}

/// One line per task of a chunk, in task order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub index: usize,
    pub outcome: WireOutcome,
}

pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message).map_err(|e| utils::serialization_error("encode message", e))?;
    writer
        .write_all(FRAME_PREFIX.as_bytes())
        .and_then(|_| writer.write_all(&body))
        .and_then(|_| writer.write_all(b"\n"))
        .and_then(|_| writer.flush())
        .map_err(|e| utils::worker_error("write message", e))
}

/// Read the next message, echoing unframed output to stderr. `Ok(None)` means the
/// other side closed the stream.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    read_message_echoing(reader, &mut io::stderr())
}

/// Like [`read_message`], with unframed output copied to `echo`.
pub fn read_message_echoing<R, W, T>(reader: &mut R, echo: &mut W) -> Result<Option<T>>
where
    R: BufRead,
    W: Write,
    T: DeserializeOwned,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| utils::worker_error("read message", e))?;
        if n == 0 {
            return Ok(None);
        }
        match find_frame(&line) {
            Some(start) => {
                // Text printed without a trailing newline ends up in front of the frame.
                if start > 0 {
                    let _ = echo.write_all(&line[..start]).and_then(|_| echo.write_all(b"\n"));
                }
                let body = &line[start + FRAME_PREFIX.len()..];
                return serde_json::from_slice(body)
                    .map(Some)
                    .map_err(|e| utils::serialization_error("decode message", e));
            }
            None => {
                if !line.iter().all(u8::is_ascii_whitespace) {
                    let _ = echo.write_all(&line);
                }
            }
        }
    }
}

fn find_frame(line: &[u8]) -> Option<usize> {
    line.windows(FRAME_PREFIX.len())
        .position(|window| window == FRAME_PREFIX.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_wire_shapes() {
        let ready = serde_json::to_string(&Handshake::Ready("square".to_string())).unwrap();
        assert_eq!(ready, r#"{"ready":"square"}"#);

        let response = TaskResponse {
            index: 2,
            outcome: WireOutcome::Failure("boom".to_string()),
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"index":2,"outcome":{"failure":"boom"}}"#
        );
    }

    fn framed(json: &str) -> Vec<u8> {
        format!("{}{}\n", FRAME_PREFIX, json).into_bytes()
    }

    #[test]
    fn test_read_skips_blank_lines_and_reports_eof() {
        let mut bytes = b"\n".to_vec();
        bytes.extend(framed(r#"{"ready":"x"}"#));
        let mut input = Cursor::new(bytes);
        let first: Option<Handshake> = read_message(&mut input).unwrap();
        assert_eq!(first, Some(Handshake::Ready("x".to_string())));

        let next: Option<Handshake> = read_message(&mut input).unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn test_unframed_output_is_echoed() {
        let mut bytes = b"hello from a task\n".to_vec();
        bytes.extend(b"no newline");
        bytes.extend(framed(r#"{"index":0,"outcome":{"success":4}}"#));
        let mut echo = Vec::new();

        let response: Option<TaskResponse> =
            read_message_echoing(&mut Cursor::new(bytes), &mut echo).unwrap();
        assert_eq!(
            response,
            Some(TaskResponse {
                index: 0,
                outcome: WireOutcome::Success(serde_json::json!(4)),
            })
        );
        assert_eq!(String::from_utf8(echo).unwrap(), "hello from a task\nno newline\n");
    }

    #[test]
    fn test_only_unframed_output_reads_as_eof() {
        let mut echo = Vec::new();
        let result: Option<Handshake> =
            read_message_echoing(&mut Cursor::new(b"{\"ready\":\"x\"}\n".to_vec()), &mut echo).unwrap();
        assert_eq!(result, None);
        assert_eq!(echo, b"{\"ready\":\"x\"}\n");
    }

    #[test]
    fn test_write_then_read_chunk() {
        let request = ChunkRequest {
            tasks: vec![WireTask {
                index: 7,
                input: serde_json::json!([1, 2]),
            }],
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &request).unwrap();
        assert!(buf.starts_with(FRAME_PREFIX.as_bytes()));
        assert!(buf.ends_with(b"\n"));

        let decoded: Option<ChunkRequest> = read_message(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, Some(request));
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        let mut input = Cursor::new(framed("not json"));
        let result: Result<Option<Handshake>> = read_message(&mut input);
        assert!(matches!(
            result,
            Err(crate::ParMapError::Serialization { .. })
        ));
    }
}
