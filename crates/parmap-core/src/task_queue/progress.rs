//! Progress reporting on the submitting side.

use indicatif::{ProgressBar, ProgressStyle};

/// Completed/total counter with an optional bar. Disabled means no counting and no output.
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
    completed: u64,
    total: u64,
}

impl ProgressReporter {
    pub fn new(total: usize, enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.dim} [{bar:40.cyan/blue}] {pos}/{len} tasks ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self::with_bar(bar)
    }

    /// Report into a caller-supplied bar (e.g. one inside a `MultiProgress`).
    pub fn with_bar(bar: ProgressBar) -> Self {
        let total = bar.length().unwrap_or(0);
        Self {
            bar: Some(bar),
            completed: 0,
            total,
        }
    }

    pub fn disabled() -> Self {
        Self {
            bar: None,
            completed: 0,
            total: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }

    /// One task finished (successfully or with a substituted failure).
    pub fn tick(&mut self) {
        if let Some(bar) = &self.bar {
            self.completed = (self.completed + 1).min(self.total);
            bar.set_position(self.completed);
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_does_not_count() {
        let mut progress = ProgressReporter::new(10, false);
        progress.tick();
        progress.tick();
        assert!(!progress.is_enabled());
        assert_eq!(progress.completed(), 0);
        progress.finish();
    }

    #[test]
    fn test_enabled_counts_up_to_total() {
        let bar = ProgressBar::hidden();
        bar.set_length(3);
        let mut progress = ProgressReporter::with_bar(bar);
        for _ in 0..5 {
            progress.tick();
        }
        assert!(progress.is_enabled());
        assert_eq!(progress.total(), 3);
        assert_eq!(progress.completed(), 3);
        progress.finish();
    }
}
