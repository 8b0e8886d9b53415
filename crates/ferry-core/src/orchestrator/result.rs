//! Aggregated result of one bulk run.

use std::fmt;
use std::time::Duration;

use crate::progress::RunProgress;
use crate::transfer::{Direction, Outcome};

/// Identifiers kept per preview list.
pub const PREVIEW_LIMIT: usize = 5;

/// First few identifiers of a category plus how many there were in total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preview {
    items: Vec<String>,
    total: usize,
}

impl Preview {
    pub fn push(&mut self, id: &str) {
        if self.items.len() < PREVIEW_LIMIT {
            self.items.push(id.to_string());
        }
        self.total += 1;
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// How many identifiers were counted but not kept.
    pub fn remainder(&self) -> usize {
        self.total - self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl fmt::Display for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.items.join(", "))?;
        if self.remainder() > 0 {
            write!(f, ", ... ({} more)", self.remainder())?;
        }
        Ok(())
    }
}

/// Counts and previews of one run. Written only by the collector loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub direction: Direction,
    /// Items handed to the run.
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub corrupted: usize,
    pub bytes_transferred: u64,
    /// Items never dispatched because the run was cancelled.
    pub not_started: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub failed_items: Preview,
    pub corrupted_items: Preview,
}

impl RunResult {
    pub fn new(direction: Direction, total: usize) -> Self {
        Self {
            direction,
            total,
            successful: 0,
            failed: 0,
            corrupted: 0,
            bytes_transferred: 0,
            not_started: 0,
            cancelled: false,
            elapsed: Duration::ZERO,
            failed_items: Preview::default(),
            corrupted_items: Preview::default(),
        }
    }

    /// Items that reached a terminal outcome.
    pub fn attempted(&self) -> usize {
        self.successful + self.failed + self.corrupted
    }

    /// Success percentage over attempted items (0.0 when nothing ran).
    pub fn success_rate(&self) -> f64 {
        match self.attempted() {
            0 => 0.0,
            n => self.successful as f64 * 100.0 / n as f64,
        }
    }

    pub(crate) fn record(&mut self, id: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Success { bytes } => {
                self.successful += 1;
                self.bytes_transferred += bytes;
            }
            Outcome::Failed { .. } => {
                self.failed += 1;
                self.failed_items.push(id);
            }
            Outcome::Corrupted { .. } => {
                self.corrupted += 1;
                self.corrupted_items.push(id);
            }
        }
    }

    pub fn progress(&self) -> RunProgress {
        RunProgress {
            total: self.total,
            completed: self.attempted(),
            successful: self.successful,
            failed: self.failed,
            corrupted: self.corrupted,
            bytes: self.bytes_transferred,
        }
    }
}
