//! Locally estimated progress counter.
//!
//! The service only reports `pending`/`done`/`error`, so the displayed
//! "processed" count is simulated: it advances one step per estimator
//! tick, holds one short of the total, and only reaches the total when
//! the orchestrator confirms completion.

/// Estimated number of processed items for one job.
///
/// Invariants: the count never decreases, never exceeds `total`, and is
/// at most `total - 1` until [`complete`](Self::complete) is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ProgressState {
    estimated_count: usize,
    total: usize,
    completed: bool,
}

impl ProgressState {
    pub fn new(total: usize) -> Self {
        Self {
            estimated_count: 0,
            total,
            completed: false,
        }
    }

    pub fn estimated_count(&self) -> usize {
        self.estimated_count
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Highest value an estimator tick may reach before completion.
    fn ceiling(&self) -> usize {
        self.total.saturating_sub(1)
    }

    /// Apply one estimator tick. Returns `true` if the count changed.
    pub fn advance(&mut self) -> bool {
        if self.completed || self.estimated_count >= self.ceiling() {
            return false;
        }
        self.estimated_count += 1;
        true
    }

    /// Force the count to `total`. Only the orchestrator calls this, once
    /// results are available. Returns `true` the first time.
    pub fn complete(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.estimated_count = self.total;
        true
    }

    /// Completion percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        percent_of(self.estimated_count, self.total)
    }
}

/// `processed` as a percentage of `total`, `0` for an empty total.
pub fn percent_of(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((processed.min(total) * 100) / total) as u8
}
