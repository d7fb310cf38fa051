//! Log setup for the CLI and for worker processes (stderr only; stdout belongs to output
//! or, in a worker, to the pool protocol).

use std::io::Write;

use chrono::Local;
use log::LevelFilter;

/// Install the global logger. `RUST_LOG` overrides the default level.
pub fn init(quiet: bool) {
    let default = if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    let _ = env_logger::Builder::new()
        .filter_level(default)
        .parse_env("RUST_LOG")
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .try_init();
}
