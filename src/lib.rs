//! Money-Transfer Saga
//!
//! A resumable withdraw → deposit → notify transaction with retries,
//! compensation, an optional human approval gate, and authenticated
//! encryption for the history it records.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // 1. Pick an activity executor
//! let activities = Arc::new(SimulatedActivities::default());
//!
//! // 2. Build the orchestrator (journal, observer and options are optional)
//! let saga = TransferSaga::new(activities).with_options(SagaOptions::default());
//!
//! // 3. Start a run and talk to it through the handle
//! let handle = saga.start(RunId::generate(), request, ScenarioType::RequiresApproval)?;
//! handle.approve();
//! let output = handle.result().await?;
//!
//! // 4. After a crash or a fixed bug, continue from history
//! let handle = saga.resume(run_id)?;
//! ```

#![warn(missing_docs)]

// === Core Types ===
mod context;
mod errors;
mod events;
mod idempotency;
mod scenario;
mod state;
mod types;

// === Traits ===
mod traits;

// === Execution ===
mod activities;
mod handle;
mod orchestrator;
mod retry;
mod run_state;

// === Storage ===
mod codec;
mod dedupe;
mod journal;

// === Observability ===
mod observer;
mod stats;

// === Operations ===
mod client;
mod config;
mod recovery;

// === Re-exports ===

// Types
pub use context::{RunId, SagaContext};
pub use idempotency::IdempotencyKey;
pub use scenario::{ScenarioHooks, ScenarioType, TransferStep, UnknownScenario};
pub use types::{DepositResult, TransferOutput, TransferProgress, TransferRequest, TransferState};

// State
pub use run_state::{RunState, APPROVAL_CONFIRMATION, STEP_SEARCH_ATTRIBUTE};
pub use state::SagaPhase;

// Events
pub use events::SagaEvent;

// Errors
pub use errors::{
    ActivityError, ApprovalError, CodecError, SagaError, API_UNAVAILABLE, INVALID_ACCOUNT,
    INVALID_AMOUNT,
};

// Traits
pub use traits::TransferActivities;

// Execution
pub use activities::{
    LedgerEntry, LedgerOperation, SimulatedActivities, SimulatedLedger, FAULT_THRESHOLD,
    SIMULATED_CHARGE_ID,
};
pub use handle::TransferHandle;
pub use orchestrator::{TransferSaga, SIMULATED_BUG_MESSAGE};
pub use retry::{RetryDecision, RetryError, RetryPolicy};

// Storage
pub use codec::{
    AuthFailurePolicy, EncryptionCodec, Payload, PayloadCodec, DEFAULT_KEY, DEFAULT_KEY_ID,
    ENCODING_ENCRYPTED, ENCODING_JSON, METADATA_ENCODING, METADATA_KEY_ID,
};
pub use dedupe::{DedupeError, IdempotencyStore, InMemoryIdempotencyStore};
pub use journal::{HistoryJournal, InMemoryJournal, JournalEntry, JournalError};

// Observability
pub use observer::{NoOpObserver, SagaObserver, TracingObserver};
pub use stats::{SagaStats, SagaStatsSnapshot};

// Operations
pub use client::{TransferClient, TransferSummary};
pub use self::config::{ConfigError, SagaOptions, StepPacing, WorkerConfig, ENV_PREFIX};
pub use recovery::{recover_runs, RecordedActivity, RunHistory, RunStatus};
