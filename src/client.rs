//! In-process client: start, look up, list and resume runs

use crate::{
    recover_runs, RunId, RunState, SagaError, SagaPhase, ScenarioType, TransferHandle,
    TransferProgress, TransferRequest, TransferSaga,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One row of [`TransferClient::list`]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    /// Run ID
    pub run_id: RunId,
    /// Workflow type the scenario is registered under
    pub workflow_type: &'static str,
    /// Scenario
    pub scenario: ScenarioType,
    /// Amount moved
    pub amount: Decimal,
    /// Debited account
    pub from_account: String,
    /// Credited account
    pub to_account: String,
    /// Last query result
    pub progress: TransferProgress,
    /// Current phase
    pub phase: SagaPhase,
}

struct RunEntry {
    scenario: ScenarioType,
    request: TransferRequest,
    state: Arc<RunState>,
}

/// Registry of the runs started through one orchestrator
pub struct TransferClient {
    saga: TransferSaga,
    runs: RwLock<HashMap<RunId, RunEntry>>,
}

impl TransferClient {
    /// Create a client for `saga`
    pub fn new(saga: TransferSaga) -> Self {
        Self {
            saga,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Orchestrator used for new runs
    pub fn saga(&self) -> &TransferSaga {
        &self.saga
    }

    /// Swap the orchestrator, e.g. to deploy a fix before resuming runs
    pub fn set_saga(&mut self, saga: TransferSaga) {
        self.saga = saga;
    }

    /// Start a run; a random run ID is generated when none is given
    pub fn start_transfer(
        &self,
        run_id: Option<RunId>,
        request: TransferRequest,
        scenario: ScenarioType,
    ) -> Result<TransferHandle, SagaError> {
        let run_id = run_id.unwrap_or_else(RunId::generate);
        let handle = self.saga.start(run_id, request, scenario)?;
        self.register(&handle);
        tracing::info!(run_id = %handle.run_id(), workflow_type = scenario.workflow_type(), "Transfer started");
        Ok(handle)
    }

    /// `transferStatus` query
    pub fn status(&self, run_id: &RunId) -> Result<TransferProgress, SagaError> {
        self.with_state(run_id, |state| state.progress())
    }

    /// `approveTransfer` signal
    pub fn approve(&self, run_id: &RunId) -> Result<(), SagaError> {
        self.with_state(run_id, |state| {
            state.signal_approval();
        })
    }

    /// `approveTransferUpdate`
    pub fn approve_update(&self, run_id: &RunId) -> Result<String, SagaError> {
        let confirmation = self.with_state(run_id, |state| state.update_approval())??;
        Ok(confirmation.to_string())
    }

    /// Every known run, ordered by run ID
    pub fn list(&self) -> Vec<TransferSummary> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<TransferSummary> = runs
            .iter()
            .map(|(run_id, entry)| TransferSummary {
                run_id: run_id.clone(),
                workflow_type: entry.scenario.workflow_type(),
                scenario: entry.scenario,
                amount: entry.request.amount,
                from_account: entry.request.from_account.clone(),
                to_account: entry.request.to_account.clone(),
                progress: entry.state.progress(),
                phase: entry.state.phase(),
            })
            .collect();
        rows.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        rows
    }

    /// Resume a run from its history; `AlreadyStarted` while the run is live
    pub fn resume(&self, run_id: &RunId) -> Result<TransferHandle, SagaError> {
        let handle = self.saga.resume(run_id.clone())?;
        self.register(&handle);
        Ok(handle)
    }

    /// Resume every run the journal reports as running or stalled
    pub fn recover(&self) -> Result<Vec<TransferHandle>, SagaError> {
        let pending = recover_runs(self.saga.journal().as_ref())?;
        let mut handles = Vec::with_capacity(pending.len());
        for (run_id, _) in pending {
            match self.resume(&run_id) {
                Ok(handle) => handles.push(handle),
                Err(SagaError::AlreadyStarted(_)) => {
                    tracing::debug!(run_id = %run_id, "Run is live, skipping recovery");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(handles)
    }

    fn register(&self, handle: &TransferHandle) {
        let entry = RunEntry {
            scenario: handle.scenario(),
            request: handle.request().clone(),
            state: handle.state(),
        };
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.run_id().clone(), entry);
    }

    fn with_state<R>(&self, run_id: &RunId, f: impl FnOnce(&RunState) -> R) -> Result<R, SagaError> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        match runs.get(run_id) {
            Some(entry) => Ok(f(&entry.state)),
            None => Err(SagaError::UnknownRun(run_id.clone())),
        }
    }
}
