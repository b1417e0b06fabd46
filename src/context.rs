//! Run identity and per-run context

use crate::{IdempotencyKey, ScenarioType};
use serde::{Deserialize, Serialize};

/// Identifier of one saga run, unique per logical transfer
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub Box<str>);

impl RunId {
    /// Create a run ID from an externally chosen identifier
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random run ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into_boxed_str())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Correlation context carried through every step of one run
#[derive(Clone, Serialize, Deserialize)]
pub struct SagaContext {
    /// Run being executed
    pub run_id: RunId,
    /// Scenario selected at start
    pub scenario: ScenarioType,
    /// Key shared by withdraw and deposit; fixed once recorded
    pub idempotency_key: Option<IdempotencyKey>,
    /// When the run (or its resumption) started (millis since UNIX epoch)
    pub started_at_millis: u64,
}

impl SagaContext {
    /// Create the context for a new or resumed run
    pub fn new(run_id: RunId, scenario: ScenarioType) -> Self {
        Self {
            run_id,
            scenario,
            idempotency_key: None,
            started_at_millis: Self::now_millis(),
        }
    }

    /// Get current time in milliseconds since UNIX epoch
    pub fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Calculate elapsed wall time since the run started
    pub fn elapsed_millis(&self) -> u64 {
        Self::now_millis().saturating_sub(self.started_at_millis)
    }
}

impl std::fmt::Debug for SagaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaContext")
            .field("run_id", &self.run_id)
            .field("scenario", &self.scenario)
            .field("idempotency_key", &self.idempotency_key)
            .finish()
    }
}
