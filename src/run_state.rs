//! Observable state of one run: progress, phase, approval latch, search attributes

use crate::{ApprovalError, DepositResult, SagaError, SagaPhase, TransferProgress, TransferState};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

/// Confirmation returned by a successful approval update
pub const APPROVAL_CONFIRMATION: &str = "successfully approved transfer";

/// Search attribute key holding the current step
pub const STEP_SEARCH_ATTRIBUTE: &str = "Step";

#[derive(Default)]
struct Inner {
    progress: TransferProgress,
    phase: SagaPhase,
    approved: bool,
    search_attributes: BTreeMap<String, String>,
}

/// State shared between a run and its external callers.
///
/// The run is the only writer of progress and phase. Approval handlers
/// check and set the latch under the same write lock, so a late signal can
/// never race the gate closing on timeout. Reads clone a snapshot and never
/// wait on the run.
pub struct RunState {
    inner: RwLock<Inner>,
    approval: watch::Sender<bool>,
}

impl RunState {
    /// Create the state of a run; `approval_time_secs` is what queries report
    pub fn new(approval_time_secs: u64) -> Self {
        let mut inner = Inner::default();
        inner.progress.approval_time = approval_time_secs;
        let (approval, _) = watch::channel(false);
        Self {
            inner: RwLock::new(inner),
            approval,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// `transferStatus` query
    pub fn progress(&self) -> TransferProgress {
        self.read().progress.clone()
    }

    /// Current phase
    pub fn phase(&self) -> SagaPhase {
        self.read().phase
    }

    /// Whether the approval latch is set
    pub fn is_approved(&self) -> bool {
        self.read().approved
    }

    /// Record a progress checkpoint; the percentage never decreases
    pub fn checkpoint(&self, percentage: u8, state: TransferState) {
        let mut inner = self.write();
        let progress = &mut inner.progress;
        progress.progress_percentage = progress.progress_percentage.max(percentage.min(100));
        progress.transfer_state = state;
    }

    /// Store the deposit result
    pub fn set_deposit_result(&self, result: DepositResult) {
        self.write().progress.deposit_result = result;
    }

    /// Move to the next phase
    pub fn transition(&self, next: SagaPhase) -> Result<(), SagaError> {
        let mut inner = self.write();
        inner.phase = inner.phase.transition(next)?;
        Ok(())
    }

    /// End the run as failed; no-op once terminal
    pub fn mark_failed(&self) {
        let mut inner = self.write();
        if !inner.phase.is_terminal() {
            inner.phase = SagaPhase::Failed;
        }
    }

    /// Open the approval gate
    pub fn open_approval_window(&self, percentage: u8) -> Result<(), SagaError> {
        let mut inner = self.write();
        inner.phase = inner.phase.transition(SagaPhase::WaitingForApproval)?;
        let progress = &mut inner.progress;
        progress.progress_percentage = progress.progress_percentage.max(percentage);
        progress.transfer_state = TransferState::Waiting;
        Ok(())
    }

    /// Watch the approval latch
    pub fn subscribe_approval(&self) -> watch::Receiver<bool> {
        self.approval.subscribe()
    }

    /// Approval signal: fire and forget.
    ///
    /// Applies only while the gate is open; otherwise it is logged and
    /// dropped, never queued. Returns whether the latch was set.
    pub fn signal_approval(&self) -> bool {
        let mut inner = self.write();
        if inner.phase != SagaPhase::WaitingForApproval || inner.approved {
            tracing::info!(phase = %inner.phase, approved = inner.approved, "Approval signal ignored, transfer is not waiting for approval");
            return false;
        }
        inner.approved = true;
        self.approval.send_replace(true);
        tracing::info!("Approval signal received");
        true
    }

    /// Approval update validator
    pub fn validate_approval(&self) -> Result<(), ApprovalError> {
        Self::check_approvable(&self.read())
    }

    fn check_approvable(inner: &Inner) -> Result<(), ApprovalError> {
        if inner.approved {
            return Err(ApprovalError::AlreadyApproved);
        }
        if inner.phase != SagaPhase::WaitingForApproval {
            return Err(ApprovalError::NotAwaitingApproval);
        }
        Ok(())
    }

    /// Approval update: validate and set the latch atomically
    pub fn update_approval(&self) -> Result<&'static str, ApprovalError> {
        let mut inner = self.write();
        Self::check_approvable(&inner)?;
        inner.approved = true;
        self.approval.send_replace(true);
        tracing::info!("Approval update accepted");
        Ok(APPROVAL_CONFIRMATION)
    }

    /// Restore an approval recorded in history
    pub fn restore_approval(&self) {
        self.write().approved = true;
        self.approval.send_replace(true);
    }

    /// Close the gate after the approval window elapsed.
    ///
    /// Returns `true` if an approval was latched before the gate closed;
    /// otherwise the run is marked failed and later approvals are rejected.
    pub fn close_approval_window(&self) -> bool {
        let mut inner = self.write();
        if inner.approved {
            return true;
        }
        inner.phase = SagaPhase::Failed;
        false
    }

    /// Upsert a search attribute
    pub fn upsert_search_attribute(&self, key: &str, value: &str) {
        self.write()
            .search_attributes
            .insert(key.to_string(), value.to_string());
    }

    /// Read a search attribute
    pub fn search_attribute(&self, key: &str) -> Option<String> {
        self.read().search_attributes.get(key).cloned()
    }

    /// All search attributes
    pub fn search_attributes(&self) -> BTreeMap<String, String> {
        self.read().search_attributes.clone()
    }
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("RunState")
            .field("progress", &inner.progress)
            .field("phase", &inner.phase)
            .field("approved", &inner.approved)
            .finish()
    }
}
