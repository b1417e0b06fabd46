//! Simulated activity executor with attempt-keyed fault injection

use crate::errors::{API_UNAVAILABLE, INVALID_ACCOUNT, INVALID_AMOUNT};
use crate::{
    ActivityError, DepositResult, IdempotencyKey, IdempotencyStore, InMemoryIdempotencyStore,
    ScenarioType, TransferActivities, TransferRequest,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Faults are injected on attempts below this number
pub const FAULT_THRESHOLD: u32 = 5;

/// Charge identifier returned by every successful simulated deposit
pub const SIMULATED_CHARGE_ID: &str = "example-transfer-id";

/// Side effect recorded by the simulated bank
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerOperation {
    /// Source account debited
    Withdraw,
    /// Target account credited
    Deposit,
    /// Debit reversed
    UndoWithdraw,
}

/// One applied side effect
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerEntry {
    /// Operation applied
    pub operation: LedgerOperation,
    /// Amount moved
    pub amount: Decimal,
    /// Key the effect was applied under, if any
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Observable side effects of the simulated bank
#[derive(Default)]
pub struct SimulatedLedger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl SimulatedLedger {
    fn push(&self, entry: LedgerEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// All applied effects, in order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of applied effects of one kind
    pub fn count(&self, operation: LedgerOperation) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.operation == operation)
            .count()
    }
}

/// Activity executor that simulates remote calls.
///
/// Each call sleeps `delay / attempt`, so retries answer faster. Withdraw
/// reports a transient outage and deposit a terminal account rejection while
/// the scenario asks for it and `attempt < FAULT_THRESHOLD`.
pub struct SimulatedActivities {
    delay: Duration,
    applied: Arc<dyn IdempotencyStore>,
    ledger: Arc<SimulatedLedger>,
}

impl SimulatedActivities {
    /// Create an executor with the given base latency
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            applied: Arc::new(InMemoryIdempotencyStore::new()),
            ledger: Arc::new(SimulatedLedger::default()),
        }
    }

    /// Use a shared idempotency store
    pub fn with_store(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.applied = store;
        self
    }

    /// Side effects applied so far
    pub fn ledger(&self) -> Arc<SimulatedLedger> {
        self.ledger.clone()
    }

    /// Check if an operation was applied under `key`
    pub fn was_applied(&self, key: &IdempotencyKey, operation: &str) -> bool {
        self.applied.contains(&key.scoped(operation))
    }

    async fn simulate_call(&self, attempt: u32) {
        let latency = self.delay / attempt.max(1);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn apply_once(
        &self,
        key: &IdempotencyKey,
        operation: LedgerOperation,
        scope: &str,
        amount: Decimal,
    ) -> Result<(), ActivityError> {
        let fresh = self
            .applied
            .check_and_mark(&key.scoped(scope))
            .map_err(|e| ActivityError::transient("StoreUnavailable", e.to_string()))?;
        if fresh {
            self.ledger.push(LedgerEntry {
                operation,
                amount,
                idempotency_key: Some(key.clone()),
            });
        } else {
            tracing::info!(idempotency_key = %key, operation = scope, "Duplicate call acknowledged without reapplying");
        }
        Ok(())
    }
}

impl Default for SimulatedActivities {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

#[async_trait]
impl TransferActivities for SimulatedActivities {
    async fn validate(&self, request: &TransferRequest) -> Result<(), ActivityError> {
        tracing::info!(amount = %request.amount, from = %request.from_account, to = %request.to_account, "Validate activity started");
        self.simulate_call(1).await;

        if request.amount < Decimal::ZERO {
            return Err(ActivityError::terminal(
                INVALID_AMOUNT,
                format!("Transfer amount must not be negative: {}", request.amount),
            ));
        }
        Ok(())
    }

    async fn withdraw(
        &self,
        idempotency_key: &IdempotencyKey,
        amount: Decimal,
        scenario: ScenarioType,
        attempt: u32,
    ) -> Result<(), ActivityError> {
        tracing::info!(%amount, attempt, "Withdraw activity started");
        self.simulate_call(attempt).await;

        if scenario.hooks().withdraw_outage && attempt < FAULT_THRESHOLD {
            tracing::info!(attempt, "Withdraw API unavailable");
            return Err(ActivityError::transient(
                API_UNAVAILABLE,
                "Withdraw activity failed, API unavailable",
            ));
        }

        self.apply_once(idempotency_key, LedgerOperation::Withdraw, "withdraw", amount)
    }

    async fn deposit(
        &self,
        idempotency_key: &IdempotencyKey,
        amount: Decimal,
        scenario: ScenarioType,
        attempt: u32,
    ) -> Result<DepositResult, ActivityError> {
        tracing::info!(%amount, attempt, "Deposit activity started");
        self.simulate_call(attempt).await;

        if scenario.hooks().deposit_rejects_account && attempt < FAULT_THRESHOLD {
            return Err(ActivityError::terminal(
                INVALID_ACCOUNT,
                "Deposit activity failed, account is invalid",
            ));
        }

        self.apply_once(idempotency_key, LedgerOperation::Deposit, "deposit", amount)?;
        Ok(DepositResult::new(SIMULATED_CHARGE_ID))
    }

    async fn send_notification(&self, request: &TransferRequest) -> Result<(), ActivityError> {
        tracing::info!(to = %request.to_account, "Send notification activity started");
        self.simulate_call(1).await;
        Ok(())
    }

    async fn undo_withdraw(&self, amount: Decimal) -> Result<bool, ActivityError> {
        tracing::info!(%amount, "Undo withdraw activity started");
        self.simulate_call(1).await;
        self.ledger.push(LedgerEntry {
            operation: LedgerOperation::UndoWithdraw,
            amount,
            idempotency_key: None,
        });
        Ok(true)
    }
}
