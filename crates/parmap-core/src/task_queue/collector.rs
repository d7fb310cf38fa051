//! Result collection: fixed slot count, filled by index or by arrival.

use std::ops::Index;

use crate::config::CompletionMode;
use crate::error_handling::{ParMapError, Result, TaskFailure};

/// Final output of a map call: one slot per input, `None` where a failure was substituted.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultSequence<O> {
    mode: CompletionMode,
    slots: Vec<Option<O>>,
    failures: Vec<TaskFailure>,
}

impl<O> ResultSequence<O> {
    pub fn empty(mode: CompletionMode) -> Self {
        Self {
            mode,
            slots: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Layout of the slots. In as-completed mode slot i is not input i.
    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    pub fn slots(&self) -> &[Option<O>] {
        &self.slots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Option<O>> {
        self.slots.iter()
    }

    /// Failures that were substituted with a null marker, in the order observed.
    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Values of successful tasks, skipping null markers.
    pub fn successes(&self) -> impl Iterator<Item = &O> {
        self.slots.iter().flatten()
    }

    pub fn into_vec(self) -> Vec<Option<O>> {
        self.slots
    }

    /// All values, or `None` if any slot holds a null marker.
    pub fn into_complete(self) -> Option<Vec<O>> {
        self.slots.into_iter().collect()
    }
}

impl<O> Index<usize> for ResultSequence<O> {
    type Output = Option<O>;

    fn index(&self, index: usize) -> &Option<O> {
        &self.slots[index]
    }
}

impl<O> IntoIterator for ResultSequence<O> {
    type Item = Option<O>;
    type IntoIter = std::vec::IntoIter<Option<O>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

/// Accumulates outcomes while a batch runs. Not visible to callers until finalized.
pub struct ResultCollector<O> {
    mode: CompletionMode,
    total: usize,
    slots: Vec<Option<O>>,
    seen: Vec<bool>,
    received: usize,
    failures: Vec<TaskFailure>,
}

impl<O> ResultCollector<O> {
    pub fn new(total: usize, mode: CompletionMode) -> Self {
        let slots = match mode {
            CompletionMode::Ordered => (0..total).map(|_| None).collect(),
            CompletionMode::AsCompleted => Vec::with_capacity(total),
        };
        Self {
            mode,
            total,
            slots,
            seen: vec![false; total],
            received: 0,
            failures: Vec::new(),
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn record_success(&mut self, index: usize, value: O) -> Result<()> {
        self.place(index, Some(value))
    }

    /// Fill the failing task's slot with a null marker and keep the failure record.
    pub fn record_failure(&mut self, failure: TaskFailure) -> Result<()> {
        self.place(failure.index, None)?;
        self.failures.push(failure);
        Ok(())
    }

    fn place(&mut self, index: usize, slot: Option<O>) -> Result<()> {
        match self.seen.get_mut(index) {
            Some(seen) if !*seen => *seen = true,
            _ => return Err(ParMapError::UnexpectedOutcome { index }),
        }
        match self.mode {
            CompletionMode::Ordered => self.slots[index] = slot,
            CompletionMode::AsCompleted => self.slots.push(slot),
        }
        self.received += 1;
        Ok(())
    }

    pub fn finalize(self) -> Result<ResultSequence<O>> {
        if self.received != self.total {
            return Err(ParMapError::Incomplete {
                expected: self.total,
                received: self.received,
            });
        }
        Ok(ResultSequence {
            mode: self.mode,
            slots: self.slots,
            failures: self.failures,
        })
    }
}
