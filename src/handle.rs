//! Caller-side handle of one run

use crate::{
    ApprovalError, HistoryJournal, RunId, RunState, SagaContext, SagaError, SagaEvent, SagaPhase,
    ScenarioType, TransferOutput, TransferProgress, TransferRequest,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Handle returned when a run starts or resumes.
///
/// Queries and approvals go through the run's shared [`RunState`]; they
/// never wait on the run itself.
pub struct TransferHandle {
    context: SagaContext,
    request: TransferRequest,
    state: Arc<RunState>,
    task: JoinHandle<Result<TransferOutput, SagaError>>,
    journal: Arc<dyn HistoryJournal>,
}

impl TransferHandle {
    pub(crate) fn new(
        context: SagaContext,
        request: TransferRequest,
        state: Arc<RunState>,
        task: JoinHandle<Result<TransferOutput, SagaError>>,
        journal: Arc<dyn HistoryJournal>,
    ) -> Self {
        Self {
            context,
            request,
            state,
            task,
            journal,
        }
    }

    /// Run ID
    pub fn run_id(&self) -> &RunId {
        &self.context.run_id
    }

    /// Scenario the run executes
    pub fn scenario(&self) -> ScenarioType {
        self.context.scenario
    }

    /// Transfer input
    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    /// `transferStatus` query
    pub fn status(&self) -> TransferProgress {
        self.state.progress()
    }

    /// Current phase
    pub fn phase(&self) -> SagaPhase {
        self.state.phase()
    }

    /// Shared run state
    pub fn state(&self) -> Arc<RunState> {
        self.state.clone()
    }

    /// `approveTransfer` signal; ignored unless the run is waiting for approval
    pub fn approve(&self) {
        self.state.signal_approval();
    }

    /// `approveTransferUpdate`; returns the confirmation message
    pub fn approve_update(&self) -> Result<String, ApprovalError> {
        self.state.update_approval().map(str::to_string)
    }

    /// Read a search attribute
    pub fn search_attribute(&self, key: &str) -> Option<String> {
        self.state.search_attribute(key)
    }

    /// Check if the run task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the run.
    ///
    /// Returns `false` if the run had already ended. Compensation in flight
    /// at the moment of cancellation is not guaranteed to complete. A cancel
    /// that still races the run's own end is ignored when history is rebuilt.
    pub fn cancel(&self) -> Result<bool, SagaError> {
        if self.task.is_finished() || self.state.phase().is_terminal() {
            return Ok(false);
        }

        let phase = self.state.phase();
        self.task.abort();
        if self.state.phase().is_terminal() {
            // The run reached its own end before the abort landed
            return Ok(false);
        }
        self.state.mark_failed();
        self.journal.append(&self.context.run_id, SagaEvent::SagaCancelled)?;

        tracing::warn!(run_id = %self.context.run_id, phase = %phase, "Transfer cancelled");
        Ok(true)
    }

    /// Wait for the run's outcome
    pub async fn result(self) -> Result<TransferOutput, SagaError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(SagaError::Cancelled),
            Err(e) => Err(SagaError::WorkflowBug(format!("run task panicked: {e}").into())),
        }
    }
}

impl std::fmt::Debug for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHandle")
            .field("run_id", &self.context.run_id)
            .field("scenario", &self.context.scenario)
            .field("phase", &self.state.phase())
            .finish()
    }
}
