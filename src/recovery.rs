//! History rebuild and recovery scan

use crate::{
    HistoryJournal, IdempotencyKey, JournalEntry, JournalError, RunId, SagaEvent, ScenarioType,
    TransferRequest, TransferStep,
};
use std::collections::HashMap;

/// Status of a run as reconstructed from its history
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunStatus {
    /// No terminal event yet
    #[default]
    Running,
    /// Finished successfully
    Completed,
    /// Failed or cancelled; cannot be resumed
    Failed,
    /// Failed on a workflow bug; resumable once the code is fixed
    Stalled,
}

impl RunStatus {
    /// Check if the run needs attention from a recovery pass
    pub fn needs_recovery(&self) -> bool {
        matches!(self, Self::Running | Self::Stalled)
    }
}

/// Activity result recorded in history
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedActivity {
    /// Attempts it took
    pub attempts: u32,
    /// Serialized result
    pub output: serde_json::Value,
}

/// Everything a run decided so far, folded from its history
#[derive(Clone, Debug, Default)]
pub struct RunHistory {
    /// Transfer input, once the start event is seen
    pub request: Option<TransferRequest>,
    /// Behavior branch
    pub scenario: ScenarioType,
    /// Recorded idempotency key
    pub idempotency_key: Option<IdempotencyKey>,
    /// Completed activities by step
    pub completed: HashMap<TransferStep, RecordedActivity>,
    /// When the open approval gate closes, if it was opened
    pub approval_deadline_millis: Option<u64>,
    /// Whether the approval gate was passed
    pub approval_received: bool,
    /// Reconstructed status
    pub status: RunStatus,
    /// Failure message of the last failure, if any
    pub failure: Option<Box<str>>,
}

impl RunHistory {
    /// Rebuild from history entries
    pub fn rebuild(entries: &[JournalEntry]) -> Self {
        let mut history = Self::default();

        for entry in entries {
            match &entry.event {
                SagaEvent::SagaStarted { request, scenario, .. } => {
                    history.request = Some(request.clone());
                    history.scenario = *scenario;
                    history.status = RunStatus::Running;
                }
                SagaEvent::SagaResumed { .. } => {
                    history.status = RunStatus::Running;
                    history.failure = None;
                }
                SagaEvent::IdempotencyKeyRecorded { key } => {
                    history.idempotency_key = Some(key.clone());
                }
                SagaEvent::ActivityCompleted { step, attempts, output } => {
                    history.completed.insert(
                        *step,
                        RecordedActivity {
                            attempts: *attempts,
                            output: output.clone(),
                        },
                    );
                }
                SagaEvent::ApprovalWaiting { deadline_millis } => {
                    history.approval_deadline_millis = Some(*deadline_millis);
                }
                SagaEvent::ApprovalReceived => history.approval_received = true,
                SagaEvent::SagaCompleted { .. } => history.status = RunStatus::Completed,
                SagaEvent::SagaFailed { reason, recoverable } => {
                    history.status = if *recoverable {
                        RunStatus::Stalled
                    } else {
                        RunStatus::Failed
                    };
                    history.failure = Some(reason.clone());
                }
                // A cancel racing the run's own end does not override it
                SagaEvent::SagaCancelled if history.status == RunStatus::Running => {
                    history.status = RunStatus::Failed;
                    history.failure = Some("cancelled".into());
                }
                _ => {}
            }
        }

        history
    }

    /// Recorded result of a step
    pub fn completed(&self, step: TransferStep) -> Option<&RecordedActivity> {
        self.completed.get(&step)
    }
}

/// Find runs that are still running or stalled on a recoverable failure
pub fn recover_runs(journal: &dyn HistoryJournal) -> Result<Vec<(RunId, RunHistory)>, JournalError> {
    let mut recovered = Vec::new();

    for run_id in journal.list_runs()? {
        let history = RunHistory::rebuild(&journal.read(&run_id)?);
        if history.status.needs_recovery() {
            tracing::info!(run_id = %run_id, status = ?history.status, "Run needs recovery");
            recovered.push((run_id, history));
        }
    }

    Ok(recovered)
}
