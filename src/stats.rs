//! Saga statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Orchestrator-wide counters
#[derive(Default)]
pub struct SagaStats {
    /// Runs started or resumed
    pub runs_started: AtomicU64,
    /// Runs finished successfully
    pub runs_completed: AtomicU64,
    /// Runs ended with a failure
    pub runs_failed: AtomicU64,
    /// Activity attempts issued
    pub activity_attempts: AtomicU64,
    /// Attempts followed by a retry
    pub activity_retries: AtomicU64,
    /// Activity results served from history
    pub steps_replayed: AtomicU64,
    /// Approvals received in time
    pub approvals_received: AtomicU64,
    /// Approval windows that elapsed
    pub approvals_timed_out: AtomicU64,
    /// Compensations started
    pub compensations_started: AtomicU64,
    /// Compensations succeeded
    pub compensations_completed: AtomicU64,
    /// Compensations failed
    pub compensations_failed: AtomicU64,
}

impl SagaStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> SagaStatsSnapshot {
        SagaStatsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            activity_attempts: self.activity_attempts.load(Ordering::Relaxed),
            activity_retries: self.activity_retries.load(Ordering::Relaxed),
            steps_replayed: self.steps_replayed.load(Ordering::Relaxed),
            approvals_received: self.approvals_received.load(Ordering::Relaxed),
            approvals_timed_out: self.approvals_timed_out.load(Ordering::Relaxed),
            compensations_started: self.compensations_started.load(Ordering::Relaxed),
            compensations_completed: self.compensations_completed.load(Ordering::Relaxed),
            compensations_failed: self.compensations_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`SagaStats`]
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SagaStatsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub activity_attempts: u64,
    pub activity_retries: u64,
    pub steps_replayed: u64,
    pub approvals_received: u64,
    pub approvals_timed_out: u64,
    pub compensations_started: u64,
    pub compensations_completed: u64,
    pub compensations_failed: u64,
}
