#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use transfer_saga::{
    ActivityError, DepositResult, IdempotencyKey, InMemoryJournal, SagaContext, SagaError,
    SagaObserver, SagaOptions, ScenarioType, SimulatedActivities, SimulatedLedger,
    TransferActivities, TransferRequest, TransferSaga, TransferStep,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn request() -> TransferRequest {
    TransferRequest::new(dec!(100), "account1", "account2")
}

/// Simulated executor that counts invocations per step
pub struct CountingActivities {
    inner: SimulatedActivities,
    calls: Mutex<HashMap<TransferStep, u32>>,
    keys: Mutex<Vec<IdempotencyKey>>,
}

impl CountingActivities {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(1000))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: SimulatedActivities::new(delay),
            calls: Mutex::new(HashMap::new()),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self, step: TransferStep) -> u32 {
        self.calls.lock().unwrap().get(&step).copied().unwrap_or(0)
    }

    /// Idempotency keys seen by withdraw and deposit, in call order
    pub fn keys(&self) -> Vec<IdempotencyKey> {
        self.keys.lock().unwrap().clone()
    }

    pub fn ledger(&self) -> Arc<SimulatedLedger> {
        self.inner.ledger()
    }

    pub fn simulated(&self) -> &SimulatedActivities {
        &self.inner
    }

    fn bump(&self, step: TransferStep) {
        *self.calls.lock().unwrap().entry(step).or_default() += 1;
    }
}

#[async_trait]
impl TransferActivities for CountingActivities {
    async fn validate(&self, request: &TransferRequest) -> Result<(), ActivityError> {
        self.bump(TransferStep::Validate);
        self.inner.validate(request).await
    }

    async fn withdraw(
        &self,
        idempotency_key: &IdempotencyKey,
        amount: Decimal,
        scenario: ScenarioType,
        attempt: u32,
    ) -> Result<(), ActivityError> {
        self.bump(TransferStep::Withdraw);
        self.keys.lock().unwrap().push(idempotency_key.clone());
        self.inner.withdraw(idempotency_key, amount, scenario, attempt).await
    }

    async fn deposit(
        &self,
        idempotency_key: &IdempotencyKey,
        amount: Decimal,
        scenario: ScenarioType,
        attempt: u32,
    ) -> Result<DepositResult, ActivityError> {
        self.bump(TransferStep::Deposit);
        self.keys.lock().unwrap().push(idempotency_key.clone());
        self.inner.deposit(idempotency_key, amount, scenario, attempt).await
    }

    async fn send_notification(&self, request: &TransferRequest) -> Result<(), ActivityError> {
        self.bump(TransferStep::SendNotification);
        self.inner.send_notification(request).await
    }

    async fn undo_withdraw(&self, amount: Decimal) -> Result<bool, ActivityError> {
        self.bump(TransferStep::UndoWithdraw);
        self.inner.undo_withdraw(amount).await
    }
}

/// Executor whose undo-withdraw always fails
pub struct FailingUndo(pub CountingActivities);

#[async_trait]
impl TransferActivities for FailingUndo {
    async fn validate(&self, request: &TransferRequest) -> Result<(), ActivityError> {
        self.0.validate(request).await
    }

    async fn withdraw(&self, key: &IdempotencyKey, amount: Decimal, scenario: ScenarioType, attempt: u32) -> Result<(), ActivityError> {
        self.0.withdraw(key, amount, scenario, attempt).await
    }

    async fn deposit(&self, key: &IdempotencyKey, amount: Decimal, scenario: ScenarioType, attempt: u32) -> Result<DepositResult, ActivityError> {
        self.0.deposit(key, amount, scenario, attempt).await
    }

    async fn send_notification(&self, request: &TransferRequest) -> Result<(), ActivityError> {
        self.0.send_notification(request).await
    }

    async fn undo_withdraw(&self, _amount: Decimal) -> Result<bool, ActivityError> {
        self.0.bump(TransferStep::UndoWithdraw);
        Err(ActivityError::terminal("LedgerClosed", "source account is closed"))
    }
}

/// Observer that records hook calls as short strings
#[derive(Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SagaObserver for RecordingObserver {
    fn on_saga_started(&self, _context: &SagaContext) {
        self.push("saga_started".into());
    }
    fn on_step_started(&self, _context: &SagaContext, step: TransferStep, attempt: u32) {
        self.push(format!("step_started:{step}:{attempt}"));
    }
    fn on_step_completed(&self, _context: &SagaContext, step: TransferStep, attempts: u32, _duration_millis: u64) {
        self.push(format!("step_completed:{step}:{attempts}"));
    }
    fn on_step_failed(&self, _context: &SagaContext, step: TransferStep, attempt: u32, _error: &ActivityError, will_retry: bool) {
        self.push(format!("step_failed:{step}:{attempt}:{will_retry}"));
    }
    fn on_search_attribute(&self, _context: &SagaContext, key: &str, value: &str) {
        self.push(format!("search_attribute:{key}={value}"));
    }
    fn on_approval_waiting(&self, _context: &SagaContext, approval_time_secs: u64) {
        self.push(format!("approval_waiting:{approval_time_secs}"));
    }
    fn on_approval_received(&self, _context: &SagaContext) {
        self.push("approval_received".into());
    }
    fn on_approval_timed_out(&self, _context: &SagaContext, approval_time_secs: u64) {
        self.push(format!("approval_timed_out:{approval_time_secs}"));
    }
    fn on_compensation_started(&self, _context: &SagaContext, step: TransferStep) {
        self.push(format!("compensation_started:{step}"));
    }
    fn on_compensation_completed(&self, _context: &SagaContext, step: TransferStep) {
        self.push(format!("compensation_completed:{step}"));
    }
    fn on_compensation_failed(&self, _context: &SagaContext, step: TransferStep, _error: &ActivityError) {
        self.push(format!("compensation_failed:{step}"));
    }
    fn on_saga_completed(&self, _context: &SagaContext) {
        self.push("saga_completed".into());
    }
    fn on_saga_failed(&self, _context: &SagaContext, error: &SagaError) {
        self.push(format!("saga_failed:{}", error.is_recoverable()));
    }
}

/// Orchestrator over counting activities with a shared in-memory journal
pub fn saga(activities: &Arc<CountingActivities>, journal: &Arc<InMemoryJournal>) -> TransferSaga {
    init_tracing();
    TransferSaga::new(activities.clone())
        .with_journal(journal.clone())
        .with_options(SagaOptions::default())
}
