//! Error types for activities, approval, and saga execution

use crate::{JournalError, RunId, TransferStep};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kind reported by a withdraw during an API outage
pub const API_UNAVAILABLE: &str = "ApiUnavailable";
/// Error kind reported by a deposit into a rejected account
pub const INVALID_ACCOUNT: &str = "InvalidAccount";
/// Error kind reported by validate for a negative amount
pub const INVALID_AMOUNT: &str = "InvalidAmount";

/// Error from an activity invocation
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActivityError {
    /// Temporary error - can retry with exponential backoff
    #[error("{reason}")]
    Transient {
        /// Error kind, matched against the retry policy's non-retryable set
        kind: Box<str>,
        /// Error description
        reason: Box<str>,
    },
    /// Permanent error - never retried
    #[error("{reason}")]
    Terminal {
        /// Error kind
        kind: Box<str>,
        /// Error description
        reason: Box<str>,
    },
}

impl ActivityError {
    /// Create a transient error
    pub fn transient(kind: &str, reason: impl Into<Box<str>>) -> Self {
        Self::Transient {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Create a terminal error
    pub fn terminal(kind: &str, reason: impl Into<Box<str>>) -> Self {
        Self::Terminal {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Error kind
    pub fn kind(&self) -> &str {
        match self {
            Self::Transient { kind, .. } | Self::Terminal { kind, .. } => kind,
        }
    }

    /// Error description
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient { reason, .. } | Self::Terminal { reason, .. } => reason,
        }
    }

    /// Check if the activity itself flagged the error as retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Rejection returned by the approval update validator
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// The latch is already set
    #[error("Validation Failed: Transfer already approved")]
    AlreadyApproved,
    /// The run is not blocked on the approval gate
    #[error("Validation Failed: Transfer doesn't require approval")]
    NotAwaitingApproval,
}

/// Terminal outcome of a failed run
#[derive(Debug, Error)]
pub enum SagaError {
    /// Activity failed terminally or exhausted its retries
    #[error("{step} failed after {attempts} attempt(s): {source}")]
    Activity {
        /// Step that failed
        step: TransferStep,
        /// Attempts made
        attempts: u32,
        /// Last activity error
        source: ActivityError,
    },
    /// Approval gate timed out
    #[error("Approval not received within {seconds} seconds")]
    ApprovalTimeout {
        /// Configured approval window
        seconds: u64,
    },
    /// Deposit failed and the withdraw was compensated
    #[error("Deposit failed: {source}")]
    DepositFailed {
        /// Deposit error
        source: ActivityError,
    },
    /// Deposit failed and the compensating undo-withdraw failed too
    #[error("Compensation failed after deposit failure ({deposit}): {compensation}")]
    CompensationFailed {
        /// Original deposit error
        deposit: ActivityError,
        /// Compensation error
        compensation: ActivityError,
    },
    /// Bug in orchestration code; recoverable by fixing and resuming the run
    #[error("Workflow bug: {0}")]
    WorkflowBug(Box<str>),
    /// Approval update rejected by its validator
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    /// Run cancelled while suspended
    #[error("Transfer cancelled")]
    Cancelled,
    /// A live run already uses this ID
    #[error("Transfer {0} already started")]
    AlreadyStarted(RunId),
    /// No run or history exists for this ID
    #[error("Unknown transfer {0}")]
    UnknownRun(RunId),
    /// Run history cannot be resumed
    #[error("Transfer {run_id} cannot be resumed: {reason}")]
    NotResumable {
        /// Run ID
        run_id: RunId,
        /// Why
        reason: Box<str>,
    },
    /// State machine rejected a transition
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase
        from: &'static str,
        /// Requested phase
        to: &'static str,
    },
    /// History could not be read or written
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),
    /// Recorded history could not be decoded
    #[error("History error: {0}")]
    History(#[from] serde_json::Error),
}

impl SagaError {
    /// Check if the run can be fixed and resumed from its history
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::WorkflowBug(_))
    }

    /// Check if this failure left money in an unreconciled state
    pub fn needs_manual_remediation(&self) -> bool {
        matches!(self, Self::CompensationFailed { .. })
    }
}

/// Error from the payload codec
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload was encrypted under a different key
    #[error("Unrecognized key ID {found}. Current key ID is {expected}.")]
    UnrecognizedKeyId {
        /// Key ID found on the payload
        found: Box<str>,
        /// Configured key ID
        expected: Box<str>,
    },
    /// Authentication tag did not verify
    #[error("Payload authentication failed")]
    Authentication,
    /// Encrypted blob is structurally invalid
    #[error("Malformed payload: {0}")]
    Malformed(Box<str>),
    /// Key has the wrong length
    #[error("Invalid encryption key: {0}")]
    InvalidKey(Box<str>),
    /// Plaintext could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_error_classification() {
        let outage = ActivityError::transient(API_UNAVAILABLE, "Withdraw activity failed, API unavailable");
        assert!(outage.is_retryable());
        assert_eq!(outage.kind(), API_UNAVAILABLE);

        let invalid = ActivityError::terminal(INVALID_ACCOUNT, "Deposit activity failed, account is invalid");
        assert!(!invalid.is_retryable());
        assert_eq!(invalid.to_string(), "Deposit activity failed, account is invalid");
    }

    #[test]
    fn test_saga_error_messages() {
        let timeout = SagaError::ApprovalTimeout { seconds: 30 };
        assert_eq!(timeout.to_string(), "Approval not received within 30 seconds");
        assert!(!timeout.is_recoverable());

        let bug = SagaError::WorkflowBug("Simulated bug - fix me!".into());
        assert!(bug.is_recoverable());

        let comp = SagaError::CompensationFailed {
            deposit: ActivityError::terminal(INVALID_ACCOUNT, "bad account"),
            compensation: ActivityError::transient("Timeout", "undo timed out"),
        };
        assert!(comp.needs_manual_remediation());
        assert!(comp.to_string().contains("bad account"));
        assert!(comp.to_string().contains("undo timed out"));
    }

    #[test]
    fn test_approval_error_messages() {
        assert!(ApprovalError::AlreadyApproved.to_string().starts_with("Validation Failed"));
        assert!(ApprovalError::NotAwaitingApproval.to_string().starts_with("Validation Failed"));
    }
}
