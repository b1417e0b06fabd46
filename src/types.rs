//! Transfer data types exchanged with callers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transfer input supplied by the caller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Amount to move
    pub amount: Decimal,
    /// Account debited by withdraw
    pub from_account: String,
    /// Account credited by deposit
    pub to_account: String,
}

impl TransferRequest {
    /// Create a transfer request
    pub fn new(amount: Decimal, from_account: impl Into<String>, to_account: impl Into<String>) -> Self {
        Self {
            amount,
            from_account: from_account.into(),
            to_account: to_account.into(),
        }
    }
}

/// Outcome of a successful deposit
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResult {
    /// Charge identifier returned by the deposit call; empty until deposit completes
    pub charge_id: String,
}

impl DepositResult {
    /// Create a deposit result
    pub fn new(charge_id: impl Into<String>) -> Self {
        Self {
            charge_id: charge_id.into(),
        }
    }

    /// True while no deposit has completed
    pub fn is_empty(&self) -> bool {
        self.charge_id.is_empty()
    }
}

/// Result of a completed transfer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutput {
    /// Deposit that completed the transfer
    pub deposit_result: DepositResult,
}

/// Coarse transfer state exposed to queries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Run created, nothing executed yet
    #[default]
    Starting,
    /// Executing steps
    Running,
    /// Blocked on the approval gate
    Waiting,
    /// All steps done
    Finished,
}

impl TransferState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by the `transferStatus` query
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    /// 0..=100, never decreases within a run
    pub progress_percentage: u8,
    /// Coarse state
    pub transfer_state: TransferState,
    /// Approval window in seconds; 0 when the scenario needs no approval
    pub approval_time: u64,
    /// Deposit result once deposit has completed
    pub deposit_result: DepositResult,
}
