//! Integration tests: run the parmap binary and check exit codes and output.

use std::io::Write;
use std::process::{Command, Stdio};

use parmap_core::FRAME_PREFIX;

fn parmap() -> Command {
    Command::new(env!("CARGO_BIN_EXE_parmap"))
}

#[test]
fn test_help() {
    let out = parmap().arg("--help").output().unwrap();
    assert!(out.status.success(), "parmap --help should succeed");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("primes"));
    assert!(stdout.contains("network"));
}

#[test]
fn test_version() {
    let out = parmap().arg("--version").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("parmap"));
}

#[test]
fn test_no_command_fails() {
    let out = parmap().output().unwrap();
    assert!(!out.status.success());
}

#[test]
fn test_network_quiet_prints_speedup() {
    let out = parmap()
        .args(["network", "--count", "4", "--workers", "4", "-q"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.trim().ends_with('x'), "unexpected output: {}", stdout);
}

#[test]
fn test_primes_on_process_pool() {
    let out = parmap()
        .args(["primes", "--count", "2", "--workers", "2", "--chunk-size", "1"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("SEMI-PRIME FACTORIZATION"));
    assert!(stdout.contains("Speedup"));
}

#[test]
fn test_zero_workers_rejected() {
    let out = parmap()
        .args(["network", "--count", "2", "--workers", "0"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("worker_count"), "stderr: {}", stderr);
}

#[test]
fn test_worker_mode_speaks_protocol() {
    let mut child = parmap()
        .args(["--parmap-worker", "square"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, r#"{}{{"tasks":[{{"index":0,"input":7}}]}}"#, FRAME_PREFIX).unwrap();
    }
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            format!(r#"{}{{"ready":"square"}}"#, FRAME_PREFIX),
            format!(r#"{}{{"index":0,"outcome":{{"success":49}}}}"#, FRAME_PREFIX),
        ]
    );
}

#[test]
fn test_worker_mode_keeps_task_output_unframed() {
    let mut child = parmap()
        .args(["--parmap-worker", "print_square"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, r#"{}{{"tasks":[{{"index":0,"input":3}}]}}"#, FRAME_PREFIX).unwrap();
    }
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let framed: Vec<&str> = stdout.lines().filter_map(|l| l.strip_prefix(FRAME_PREFIX)).collect();
    assert_eq!(framed, vec![r#"{"ready":"print_square"}"#, r#"{"index":0,"outcome":{"success":9}}"#]);
    assert!(stdout.lines().any(|l| l.contains("squaring 3")), "stdout: {}", stdout);
}

#[test]
fn test_worker_mode_unknown_task() {
    let out = parmap()
        .args(["--parmap-worker", "no_such_task"])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(
        stdout.trim_end(),
        format!(r#"{}{{"unknown_task":"no_such_task"}}"#, FRAME_PREFIX)
    );
}
