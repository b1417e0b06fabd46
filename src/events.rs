//! Saga history events

use crate::{ActivityError, IdempotencyKey, ScenarioType, TransferOutput, TransferRequest, TransferStep};
use serde::{Deserialize, Serialize};

/// Decision recorded in a run's history.
///
/// Replaying these in order reproduces every decision of the run: the
/// idempotency key, each completed activity's output, and the approval
/// outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SagaEvent {
    /// Run accepted
    SagaStarted {
        /// Transfer input
        request: TransferRequest,
        /// Behavior branch
        scenario: ScenarioType,
        /// Start time (millis since UNIX epoch)
        started_at_millis: u64,
    },
    /// Run picked up again from its history
    SagaResumed {
        /// Resume time (millis since UNIX epoch)
        resumed_at_millis: u64,
    },
    /// Idempotency key fixed for the rest of the run
    IdempotencyKeyRecorded {
        /// Key passed to withdraw and deposit
        key: IdempotencyKey,
    },
    /// `Step` search attribute upserted
    StepTagged {
        /// Step about to execute
        step: TransferStep,
    },
    /// Activity attempt failed
    ActivityFailed {
        /// Step
        step: TransferStep,
        /// 1-indexed attempt
        attempt: u32,
        /// Error returned
        error: ActivityError,
        /// Whether the retry policy scheduled another attempt
        will_retry: bool,
    },
    /// Activity returned successfully
    ActivityCompleted {
        /// Step
        step: TransferStep,
        /// Attempts it took
        attempts: u32,
        /// Serialized activity result
        output: serde_json::Value,
    },
    /// Approval gate opened
    ApprovalWaiting {
        /// When the gate closes (millis since UNIX epoch); a resumed run
        /// waits only for what is left of the window
        deadline_millis: u64,
    },
    /// Approval latched while the gate was open
    ApprovalReceived,
    /// Approval window elapsed
    ApprovalTimedOut {
        /// Window length
        seconds: u64,
    },
    /// Undo-withdraw started after a failed deposit
    CompensationStarted,
    /// Undo-withdraw succeeded
    CompensationCompleted,
    /// Undo-withdraw failed; money needs manual reconciliation
    CompensationFailed {
        /// Compensation error
        error: ActivityError,
    },
    /// Run finished successfully
    SagaCompleted {
        /// Run result
        output: TransferOutput,
    },
    /// Run failed
    SagaFailed {
        /// Human-readable failure message
        reason: Box<str>,
        /// Whether the run can be resumed after a code fix
        recoverable: bool,
    },
    /// Run cancelled by the caller
    SagaCancelled,
}

impl SagaEvent {
    /// Short event name for logs
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SagaStarted { .. } => "saga_started",
            Self::SagaResumed { .. } => "saga_resumed",
            Self::IdempotencyKeyRecorded { .. } => "idempotency_key_recorded",
            Self::StepTagged { .. } => "step_tagged",
            Self::ActivityFailed { .. } => "activity_failed",
            Self::ActivityCompleted { .. } => "activity_completed",
            Self::ApprovalWaiting { .. } => "approval_waiting",
            Self::ApprovalReceived => "approval_received",
            Self::ApprovalTimedOut { .. } => "approval_timed_out",
            Self::CompensationStarted => "compensation_started",
            Self::CompensationCompleted => "compensation_completed",
            Self::CompensationFailed { .. } => "compensation_failed",
            Self::SagaCompleted { .. } => "saga_completed",
            Self::SagaFailed { .. } => "saga_failed",
            Self::SagaCancelled => "saga_cancelled",
        }
    }

    /// Check if the event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SagaCompleted { .. } | Self::SagaFailed { .. } | Self::SagaCancelled
        )
    }
}
