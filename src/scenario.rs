//! Scenario selection and the per-scenario behavior table

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Demo behavior branch selected when a run starts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioType {
    /// Happy path
    #[default]
    Normal,
    /// Human approval gate before withdraw
    RequiresApproval,
    /// Orchestration fails right after withdraw until the code is fixed
    SimulatedBug,
    /// Withdraw API unavailable for the first attempts
    SimulatedDowntime,
    /// Deposit target account rejected
    InvalidAccount,
    /// Current step published as a search attribute
    AdvancedVisibility,
}

/// Behavior switches for one scenario
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScenarioHooks {
    /// Block on the approval gate after validate
    pub requires_approval: bool,
    /// Upsert the `Step` search attribute before each step
    pub tags_steps: bool,
    /// Raise a workflow bug right after withdraw
    pub fails_after_withdraw: bool,
    /// Withdraw reports a transient outage below the fault threshold
    pub withdraw_outage: bool,
    /// Deposit rejects the account below the fault threshold
    pub deposit_rejects_account: bool,
}

impl ScenarioType {
    /// All scenarios, in presentation order
    pub const ALL: [ScenarioType; 6] = [
        Self::Normal,
        Self::AdvancedVisibility,
        Self::RequiresApproval,
        Self::SimulatedDowntime,
        Self::SimulatedBug,
        Self::InvalidAccount,
    ];

    /// Behavior table entry
    pub fn hooks(&self) -> ScenarioHooks {
        let mut hooks = ScenarioHooks::default();
        match self {
            Self::Normal => {}
            Self::RequiresApproval => hooks.requires_approval = true,
            Self::SimulatedBug => hooks.fails_after_withdraw = true,
            Self::SimulatedDowntime => hooks.withdraw_outage = true,
            Self::InvalidAccount => hooks.deposit_rejects_account = true,
            Self::AdvancedVisibility => hooks.tags_steps = true,
        }
        hooks
    }

    /// Short tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::RequiresApproval => "requires-approval",
            Self::SimulatedBug => "simulated-bug",
            Self::SimulatedDowntime => "simulated-downtime",
            Self::InvalidAccount => "invalid-account",
            Self::AdvancedVisibility => "advanced-visibility",
        }
    }

    /// Workflow type name this scenario is registered under
    pub fn workflow_type(&self) -> &'static str {
        match self {
            Self::Normal => "AccountTransferWorkflow",
            Self::RequiresApproval => "AccountTransferWorkflowHumanInLoop",
            Self::SimulatedBug => "AccountTransferWorkflowRecoverableFailure",
            Self::SimulatedDowntime => "AccountTransferWorkflowAPIDowntime",
            Self::InvalidAccount => "AccountTransferWorkflowInvalidAccount",
            Self::AdvancedVisibility => "AccountTransferWorkflowAdvancedVisibility",
        }
    }
}

impl std::fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a scenario name
#[derive(Debug, thiserror::Error)]
#[error("Unknown scenario: {0}")]
pub struct UnknownScenario(pub Box<str>);

impl FromStr for ScenarioType {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s || scenario.workflow_type() == s)
            .ok_or_else(|| UnknownScenario(s.into()))
    }
}

/// Steps of the transfer, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStep {
    /// Validate the request
    Validate,
    /// Debit the source account
    Withdraw,
    /// Credit the target account
    Deposit,
    /// Notify the customer
    SendNotification,
    /// Compensate a withdraw
    UndoWithdraw,
}

impl TransferStep {
    /// Name used in logs, history and search attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "Validate",
            Self::Withdraw => "Withdraw",
            Self::Deposit => "Deposit",
            Self::SendNotification => "SendNotification",
            Self::UndoWithdraw => "UndoWithdraw",
        }
    }
}

impl std::fmt::Display for TransferStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
