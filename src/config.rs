//! Optional defaults from .parmaprc or ~/.parmaprc (JSON). CLI flags override these.

use std::path::{Path, PathBuf};

use parmap_core::{CompletionMode, ExecutionConfig, OnError};
use serde::Deserialize;

/// Defaults read from file. Missing fields keep the library defaults.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub workers: Option<usize>,
    pub chunk_size: Option<usize>,
    pub as_completed: Option<bool>,
    pub progress: Option<bool>,
    pub substitute_errors: Option<bool>,
}

impl Config {
    /// Layer these defaults over `ExecutionConfig::default()`.
    pub fn execution_config(&self) -> ExecutionConfig {
        let mut config = ExecutionConfig::default();
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        if self.as_completed == Some(true) {
            config = config.with_completion_mode(CompletionMode::AsCompleted);
        }
        if let Some(progress) = self.progress {
            config = config.with_progress(progress);
        }
        if self.substitute_errors == Some(true) {
            config = config.with_on_error(OnError::SubstituteNull);
        }
        config
    }
}

/// Load config from .parmaprc in dir, then ~/.parmaprc. Missing or invalid file = default.
pub fn load_config(dir: &Path) -> Config {
    let mut candidates = vec![dir.join(".parmaprc")];
    if let Some(home) = home_dir() {
        candidates.push(home.join(".parmaprc"));
    }
    for path in &candidates {
        if path.is_file() {
            return std::fs::read_to_string(path)
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default();
        }
    }
    Config::default()
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(any(unix, windows)))]
    {
        None
    }
}
