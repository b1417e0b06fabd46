//! Saga phase state machine

use crate::{SagaError, TransferState};
use serde::{Deserialize, Serialize};

/// Phase of one transfer run.
///
/// ```text
/// Starting -> Validating -> (WaitingForApproval)? -> Withdrawing -> Depositing -> Notifying -> Finished
///                                                                        \-> Compensating -> Failed
/// ```
///
/// Every non-terminal phase may also exit directly to `Failed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaPhase {
    /// Created, nothing executed
    #[default]
    Starting,
    /// Running validate
    Validating,
    /// Blocked on the approval gate
    WaitingForApproval,
    /// Running withdraw
    Withdrawing,
    /// Running deposit
    Depositing,
    /// Undoing the withdraw after a failed deposit
    Compensating,
    /// Running send-notification
    Notifying,
    /// Completed successfully
    Finished,
    /// Ended with a failure
    Failed,
}

impl SagaPhase {
    /// Phase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::Validating => "Validating",
            Self::WaitingForApproval => "WaitingForApproval",
            Self::Withdrawing => "Withdrawing",
            Self::Depositing => "Depositing",
            Self::Compensating => "Compensating",
            Self::Notifying => "Notifying",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
        }
    }

    /// Check if the run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Check if `next` is a legal successor
    pub fn can_transition_to(&self, next: SagaPhase) -> bool {
        use SagaPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Starting, Validating)
            | (Validating, WaitingForApproval)
            | (Validating, Withdrawing)
            | (WaitingForApproval, Withdrawing)
            | (Withdrawing, Depositing)
            | (Depositing, Notifying)
            | (Depositing, Compensating)
            | (Notifying, Finished) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition(self, next: SagaPhase) -> Result<SagaPhase, SagaError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SagaError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Coarse state reported to queries; `None` for `Failed`, which is
    /// reported out of band
    pub fn transfer_state(&self) -> Option<TransferState> {
        match self {
            Self::Starting => Some(TransferState::Starting),
            Self::WaitingForApproval => Some(TransferState::Waiting),
            Self::Finished => Some(TransferState::Finished),
            Self::Failed => None,
            _ => Some(TransferState::Running),
        }
    }
}

impl std::fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
