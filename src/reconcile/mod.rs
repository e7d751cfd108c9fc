//! Pure desired-state computations and the per-run outcome record

pub mod attribute;
pub mod build_range;

use std::fmt;

/// A write or lookup that failed without stopping the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub target: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(target: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Remote writes issued and accepted
    pub writes: usize,
    /// Writes computed but not issued (dry run)
    pub planned: usize,
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    pub fn record_failure(&mut self, target: impl Into<String>, reason: impl fmt::Display) {
        let failure = ItemFailure::new(target, reason);
        tracing::error!("{}: {}", failure.target, failure.reason);
        self.failures.push(failure);
    }

    pub fn merge(&mut self, other: RunReport) {
        self.writes += other.writes;
        self.planned += other.planned;
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
