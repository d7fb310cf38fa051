//! Thin CLI layer: parse args, styled output, and call into parmap-core.
//! Crash-proof: panic caught and reported; all errors return Result.
//! Also a process-pool worker host: started with the worker flag, it serves tasks instead.

mod config;
mod logger;
mod use_cases;

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use parmap_core::{CompletionMode, ExecutionConfig, OnError, WORKER_FLAG};
use std::env;
use std::io::IsTerminal;
use std::path::Path;

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn map_args() -> Vec<Arg> {
    vec![
        Arg::new("count")
            .long("count")
            .value_parser(clap::value_parser!(usize))
            .default_value("30")
            .help("Number of inputs to generate"),
        Arg::new("workers")
            .short('w')
            .long("workers")
            .value_parser(clap::value_parser!(usize))
            .help("Worker threads/processes (default: logical cores, or .parmaprc)"),
        Arg::new("chunk-size")
            .long("chunk-size")
            .value_parser(clap::value_parser!(usize))
            .help("Tasks per dispatched chunk in ordered mode"),
        Arg::new("as-completed")
            .long("as-completed")
            .action(ArgAction::SetTrue)
            .help("Collect results in completion order instead of input order"),
        Arg::new("progress")
            .long("progress")
            .action(ArgAction::SetTrue)
            .help("Show a progress bar"),
        Arg::new("substitute-errors")
            .long("substitute-errors")
            .action(ArgAction::SetTrue)
            .help("Put a null in failed slots and continue instead of aborting"),
        Arg::new("quiet")
            .short('q')
            .long("quiet")
            .action(ArgAction::SetTrue)
            .help("Minimal output"),
    ]
}

/// File defaults first, then flags.
fn execution_config(sub: &ArgMatches) -> Result<ExecutionConfig, String> {
    let mut config = config::load_config(Path::new(".")).execution_config();
    if let Some(&workers) = sub.get_one::<usize>("workers") {
        config = config.with_workers(workers);
    }
    if let Some(&chunk_size) = sub.get_one::<usize>("chunk-size") {
        config = config.with_chunk_size(chunk_size);
    }
    if sub.get_flag("as-completed") {
        config = config.with_completion_mode(CompletionMode::AsCompleted);
    }
    if sub.get_flag("progress") {
        config = config.with_progress(true);
    }
    if sub.get_flag("substitute-errors") {
        config = config.with_on_error(OnError::SubstituteNull);
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn print_comparison(label: &str, comparison: &use_cases::Comparison, quiet: bool) {
    if quiet {
        println!("{:.2}x", comparison.speedup());
        return;
    }
    info("\n=== EXECUTION TIME COMPARISON ===");
    println!("Sequential:      {:.2} ms", comparison.sequential_ms);
    println!("{:<16} {:.2} ms", format!("{}:", label), comparison.parallel_ms);
    success(&format!("Speedup:         {:.2}x faster", comparison.speedup()));
    if comparison.failures > 0 {
        warning(&format!("{} task(s) failed and were substituted", comparison.failures));
    }
}

fn run() -> Result<(), String> {
    let matches = Command::new("parmap")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Bhuvan Prakash <bhuvanstark6@gmail.com>")
        .about("Parallel map over thread and process pools")
        .after_help("Examples:\n  parmap primes --workers 4 --chunk-size 5\n  parmap network --count 30 --workers 10 --progress")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("primes")
                .about("CPU-bound: factor semiprimes on a process pool")
                .args(map_args()),
        )
        .subcommand(
            Command::new("network")
                .about("I/O-bound: simulated API calls on a thread pool")
                .args(map_args()),
        )
        .get_matches();

    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| "No command given. Try --help.".to_string())?;
    let quiet = sub.get_flag("quiet");
    let count = sub.get_one::<usize>("count").copied().unwrap_or(30);
    let config = execution_config(sub)?;

    match name {
        "primes" => {
            if !quiet {
                info("\n=== SEMI-PRIME FACTORIZATION USE CASE ===");
                dim(&format!(
                    "Using {} worker process(es) on {} CPU core(s)",
                    config.worker_count,
                    num_cpus::get()
                ));
            }
            let comparison = use_cases::run_prime_computation(count, &config)?;
            print_comparison("Multiprocessing", &comparison, quiet);
        }
        "network" => {
            if !quiet {
                info("\n=== NETWORK SIMULATION USE CASE ===");
                dim(&format!("Using {} worker thread(s)", config.worker_count));
            }
            let comparison = use_cases::run_network_simulation(count, &config)?;
            print_comparison("Threaded", &comparison, quiet);
        }
        other => return Err(format!("Unknown command: {}", other)),
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let quiet = args
        .iter()
        .any(|a| a == "-q" || a == "--quiet" || a == WORKER_FLAG);
    logger::init(quiet);

    if let Some(code) = parmap_core::run_worker_if_requested(&use_cases::registry()) {
        std::process::exit(code);
    }

    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
