//! Activity executor trait

use crate::{ActivityError, DepositResult, IdempotencyKey, ScenarioType, TransferRequest};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Remote operations sequenced by the transfer saga.
///
/// The orchestrator calls these through the retry policy. `attempt` is
/// 1-indexed and grows by one on every retry of the same logical call;
/// withdraw and deposit receive the same idempotency key on every attempt
/// and must apply their side effect at most once per key.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl TransferActivities for BankApi {
///     async fn withdraw(&self, key: &IdempotencyKey, amount: Decimal,
///         scenario: ScenarioType, attempt: u32) -> Result<(), ActivityError>
///     {
///         self.client.debit(key.as_str(), amount).await.map_err(into_activity_error)
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait TransferActivities: Send + Sync + 'static {
    /// Validate the request
    async fn validate(&self, request: &TransferRequest) -> Result<(), ActivityError>;

    /// Debit the source account
    async fn withdraw(
        &self,
        idempotency_key: &IdempotencyKey,
        amount: Decimal,
        scenario: ScenarioType,
        attempt: u32,
    ) -> Result<(), ActivityError>;

    /// Credit the target account
    async fn deposit(
        &self,
        idempotency_key: &IdempotencyKey,
        amount: Decimal,
        scenario: ScenarioType,
        attempt: u32,
    ) -> Result<DepositResult, ActivityError>;

    /// Notify the customer
    async fn send_notification(&self, request: &TransferRequest) -> Result<(), ActivityError>;

    /// Compensate a withdraw after a terminal deposit failure
    async fn undo_withdraw(&self, amount: Decimal) -> Result<bool, ActivityError>;
}
