//! Transfer saga orchestrator
//!
//! One run is one spawned task executing the steps in order:
//!
//! 1. checkpoint 10/starting, fix the idempotency key
//! 2. validate, checkpoint 25/running
//! 3. approval gate (30/waiting) when the scenario requires it
//! 4. withdraw, checkpoint 50/running
//! 5. deposit, checkpoint 75/running; on failure undo the withdraw and fail
//! 6. send notification, checkpoint 100/finished
//!
//! Every decision is appended to the history journal first. A resumed run
//! serves recorded activity results from history instead of calling the
//! executor again, so it reproduces the same decisions.

use crate::{
    ActivityError, HistoryJournal, IdempotencyKey, InMemoryJournal, JournalError, RetryDecision,
    RunHistory, RunId, RunState, RunStatus, SagaContext, SagaError, SagaEvent, SagaObserver,
    SagaOptions, SagaPhase, SagaStats, SagaStatsSnapshot, ScenarioType, TracingObserver,
    TransferActivities, TransferHandle, TransferOutput, TransferRequest, TransferState,
    TransferStep, STEP_SEARCH_ATTRIBUTE,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Failure raised by the simulated-bug scenario right after withdraw
pub const SIMULATED_BUG_MESSAGE: &str = "Simulated bug - fix me!";

const PROGRESS_STARTED: u8 = 10;
const PROGRESS_VALIDATED: u8 = 25;
const PROGRESS_AWAITING_APPROVAL: u8 = 30;
const PROGRESS_WITHDRAWN: u8 = 50;
const PROGRESS_DEPOSITED: u8 = 75;
const PROGRESS_FINISHED: u8 = 100;

/// Transfer saga orchestrator.
///
/// Cheap to clone; clones share the executor, journal, observer, stats and
/// the registry of live runs, so at most one task executes a run ID at a
/// time across all clones.
///
/// # Example
///
/// ```rust,ignore
/// let saga = TransferSaga::new(Arc::new(SimulatedActivities::default()));
/// let handle = saga.start(RunId::generate(), request, ScenarioType::Normal)?;
/// let output = handle.result().await?;
/// ```
#[derive(Clone)]
pub struct TransferSaga {
    activities: Arc<dyn TransferActivities>,
    journal: Arc<dyn HistoryJournal>,
    observer: Arc<dyn SagaObserver>,
    stats: Arc<SagaStats>,
    options: Arc<SagaOptions>,
    live: Arc<Mutex<HashSet<RunId>>>,
}

impl TransferSaga {
    /// Create an orchestrator with an in-memory journal and tracing observer
    pub fn new(activities: Arc<dyn TransferActivities>) -> Self {
        Self {
            activities,
            journal: Arc::new(InMemoryJournal::new()),
            observer: Arc::new(TracingObserver),
            stats: Arc::new(SagaStats::new()),
            options: Arc::new(SagaOptions::default()),
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Use another history journal
    pub fn with_journal(mut self, journal: Arc<dyn HistoryJournal>) -> Self {
        self.journal = journal;
        self
    }

    /// Use another observer
    pub fn with_observer(mut self, observer: Arc<dyn SagaObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use other options; runs already started keep theirs
    pub fn with_options(mut self, options: SagaOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Options applied to new runs
    pub fn options(&self) -> &SagaOptions {
        &self.options
    }

    /// History journal
    pub fn journal(&self) -> &Arc<dyn HistoryJournal> {
        &self.journal
    }

    /// Counter snapshot
    pub fn stats(&self) -> SagaStatsSnapshot {
        self.stats.snapshot()
    }

    /// Start a new run.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// `AlreadyStarted` if the run is live or the journal already holds
    /// history for `run_id`.
    pub fn start(
        &self,
        run_id: RunId,
        request: TransferRequest,
        scenario: ScenarioType,
    ) -> Result<TransferHandle, SagaError> {
        let mut live = self.live_runs();
        if live.contains(&run_id) {
            return Err(SagaError::AlreadyStarted(run_id));
        }
        match self.journal.read(&run_id) {
            Ok(_) => return Err(SagaError::AlreadyStarted(run_id)),
            Err(JournalError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let context = SagaContext::new(run_id.clone(), scenario);
        self.journal.append(
            &run_id,
            SagaEvent::SagaStarted {
                request: request.clone(),
                scenario,
                started_at_millis: context.started_at_millis,
            },
        )?;

        let claim = LiveClaim::new(&mut live, &self.live, run_id);
        drop(live);
        Ok(self.spawn(context, request, RunHistory::default(), claim))
    }

    /// Resume a run from its history.
    ///
    /// Runs that are still running (crashed process) or stalled on a
    /// recoverable failure continue from the first step without a recorded
    /// result. Completed and terminally failed runs are rejected, and a run
    /// that is still live fails with `AlreadyStarted`.
    pub fn resume(&self, run_id: RunId) -> Result<TransferHandle, SagaError> {
        let mut live = self.live_runs();
        if live.contains(&run_id) {
            return Err(SagaError::AlreadyStarted(run_id));
        }
        let entries = match self.journal.read(&run_id) {
            Ok(entries) => entries,
            Err(JournalError::NotFound(_)) => return Err(SagaError::UnknownRun(run_id)),
            Err(e) => return Err(e.into()),
        };

        let history = RunHistory::rebuild(&entries);
        let request = match (history.status, &history.request) {
            (RunStatus::Completed, _) => {
                return Err(SagaError::NotResumable {
                    run_id,
                    reason: "already completed".into(),
                })
            }
            (RunStatus::Failed, _) => {
                return Err(SagaError::NotResumable {
                    run_id,
                    reason: history.failure.unwrap_or_else(|| "failed".into()),
                })
            }
            (_, None) => {
                return Err(SagaError::NotResumable {
                    run_id,
                    reason: "history has no start event".into(),
                })
            }
            (_, Some(request)) => request.clone(),
        };

        let context = SagaContext::new(run_id.clone(), history.scenario);
        self.journal.append(
            &run_id,
            SagaEvent::SagaResumed {
                resumed_at_millis: context.started_at_millis,
            },
        )?;

        tracing::info!(
            run_id = %run_id,
            scenario = %history.scenario,
            recorded_steps = history.completed.len(),
            "Resuming run from history"
        );
        let claim = LiveClaim::new(&mut live, &self.live, run_id);
        drop(live);
        Ok(self.spawn(context, request, history, claim))
    }

    /// Check if a task is currently executing `run_id`
    pub fn is_live(&self, run_id: &RunId) -> bool {
        self.live_runs().contains(run_id)
    }

    fn live_runs(&self) -> MutexGuard<'_, HashSet<RunId>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(
        &self,
        mut context: SagaContext,
        request: TransferRequest,
        replay: RunHistory,
        claim: LiveClaim,
    ) -> TransferHandle {
        let approval_time = if context.scenario.hooks().requires_approval {
            self.options.approval_time.as_secs()
        } else {
            0
        };
        let state = Arc::new(RunState::new(approval_time));

        let key = replay
            .idempotency_key
            .clone()
            .unwrap_or_else(IdempotencyKey::generate);
        context.idempotency_key = Some(key.clone());

        let run = SagaRun {
            saga: self.clone(),
            context: context.clone(),
            request: request.clone(),
            key,
            state: state.clone(),
            replay,
            _claim: claim,
        };
        let task = tokio::spawn(run.run());

        TransferHandle::new(context, request, state, task, self.journal.clone())
    }
}

/// Membership of one run in the live registry; released when the run's task
/// ends or is aborted
struct LiveClaim {
    live: Arc<Mutex<HashSet<RunId>>>,
    run_id: RunId,
}

impl LiveClaim {
    /// Claim `run_id` while the caller holds the registry lock
    fn new(locked: &mut HashSet<RunId>, live: &Arc<Mutex<HashSet<RunId>>>, run_id: RunId) -> Self {
        locked.insert(run_id.clone());
        Self {
            live: live.clone(),
            run_id,
        }
    }
}

impl Drop for LiveClaim {
    fn drop(&mut self) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.run_id);
    }
}

/// Execution context of one run
struct SagaRun {
    saga: TransferSaga,
    context: SagaContext,
    request: TransferRequest,
    key: IdempotencyKey,
    state: Arc<RunState>,
    replay: RunHistory,
    _claim: LiveClaim,
}

impl SagaRun {
    async fn run(self) -> Result<TransferOutput, SagaError> {
        SagaStats::incr(&self.saga.stats.runs_started);
        self.saga.observer.on_saga_started(&self.context);

        let result = self.execute().await;
        match &result {
            Ok(output) => {
                self.record_best_effort(SagaEvent::SagaCompleted {
                    output: output.clone(),
                });
                SagaStats::incr(&self.saga.stats.runs_completed);
                self.saga.observer.on_saga_completed(&self.context);
            }
            Err(error) => {
                self.state.mark_failed();
                self.record_best_effort(SagaEvent::SagaFailed {
                    reason: error.to_string().into(),
                    recoverable: error.is_recoverable(),
                });
                SagaStats::incr(&self.saga.stats.runs_failed);
                self.saga.observer.on_saga_failed(&self.context, error);
            }
        }
        result
    }

    async fn execute(&self) -> Result<TransferOutput, SagaError> {
        let hooks = self.context.scenario.hooks();
        let pacing = self.saga.options.pacing;
        let activities = &self.saga.activities;
        let request = &self.request;
        let key = &self.key;
        let scenario = self.context.scenario;
        let amount = request.amount;

        if self.replay.idempotency_key.is_none() {
            self.record(SagaEvent::IdempotencyKeyRecorded { key: key.clone() })?;
        }
        self.state.checkpoint(PROGRESS_STARTED, TransferState::Starting);

        self.state.transition(SagaPhase::Validating)?;
        self.tag(TransferStep::Validate)?;
        self.activity(TransferStep::Validate, |_| activities.validate(request))
            .await?;
        self.pause(TransferStep::Validate, pacing.after_validate).await;
        self.state.checkpoint(PROGRESS_VALIDATED, TransferState::Running);

        if hooks.requires_approval {
            self.await_approval().await?;
        }

        self.state.transition(SagaPhase::Withdrawing)?;
        self.tag(TransferStep::Withdraw)?;
        self.activity(TransferStep::Withdraw, |attempt| {
            activities.withdraw(key, amount, scenario, attempt)
        })
        .await?;
        self.pause(TransferStep::Withdraw, pacing.after_withdraw).await;
        self.state.checkpoint(PROGRESS_WITHDRAWN, TransferState::Running);

        if hooks.fails_after_withdraw && self.saga.options.simulated_bug {
            return Err(SagaError::WorkflowBug(SIMULATED_BUG_MESSAGE.into()));
        }

        self.state.transition(SagaPhase::Depositing)?;
        self.tag(TransferStep::Deposit)?;
        let deposit = match self
            .activity(TransferStep::Deposit, |attempt| {
                activities.deposit(key, amount, scenario, attempt)
            })
            .await
        {
            Ok(result) => result,
            Err(SagaError::Activity { source, .. }) => return Err(self.compensate(source).await),
            Err(e) => return Err(e),
        };
        self.state.set_deposit_result(deposit.clone());
        self.pause(TransferStep::Deposit, pacing.after_deposit).await;
        self.state.checkpoint(PROGRESS_DEPOSITED, TransferState::Running);

        self.state.transition(SagaPhase::Notifying)?;
        self.tag(TransferStep::SendNotification)?;
        self.activity(TransferStep::SendNotification, |_| {
            activities.send_notification(request)
        })
        .await?;
        self.pause(TransferStep::SendNotification, pacing.after_notify).await;
        self.state.transition(SagaPhase::Finished)?;
        self.state.checkpoint(PROGRESS_FINISHED, TransferState::Finished);

        Ok(TransferOutput {
            deposit_result: deposit,
        })
    }

    /// Run one activity under the retry policy, or serve its recorded result
    async fn activity<T, F, Fut>(&self, step: TransferStep, mut call: F) -> Result<T, SagaError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        if let Some(recorded) = self.replay.completed(step) {
            SagaStats::incr(&self.saga.stats.steps_replayed);
            tracing::info!(run_id = %self.context.run_id, step = %step, attempts = recorded.attempts, "Replaying recorded result");
            return Ok(serde_json::from_value(recorded.output.clone())?);
        }

        let started = tokio::time::Instant::now();
        let outcome = self
            .saga
            .options
            .retry_policy
            .execute(
                |attempt| {
                    SagaStats::incr(&self.saga.stats.activity_attempts);
                    self.saga.observer.on_step_started(&self.context, step, attempt);
                    let pending = call(attempt);
                    async move { pending.await.map(|value| (attempt, value)) }
                },
                |attempt, error, decision| self.attempt_failed(step, attempt, error, decision),
            )
            .await;

        match outcome {
            Ok((attempts, value)) => {
                self.record(SagaEvent::ActivityCompleted {
                    step,
                    attempts,
                    output: serde_json::to_value(&value)?,
                })?;
                self.saga.observer.on_step_completed(
                    &self.context,
                    step,
                    attempts,
                    started.elapsed().as_millis() as u64,
                );
                Ok(value)
            }
            Err(error) => Err(SagaError::Activity {
                step,
                attempts: error.attempts(),
                source: error.into_source(),
            }),
        }
    }

    fn attempt_failed(&self, step: TransferStep, attempt: u32, error: &ActivityError, decision: RetryDecision) {
        let will_retry = decision.will_retry();
        if will_retry {
            SagaStats::incr(&self.saga.stats.activity_retries);
        }
        self.saga
            .observer
            .on_step_failed(&self.context, step, attempt, error, will_retry);
        self.record_best_effort(SagaEvent::ActivityFailed {
            step,
            attempt,
            error: error.clone(),
            will_retry,
        });
    }

    async fn await_approval(&self) -> Result<(), SagaError> {
        let seconds = self.saga.options.approval_time.as_secs();

        if self.replay.approval_received {
            self.state.restore_approval();
            tracing::info!(run_id = %self.context.run_id, "Approval restored from history");
            return Ok(());
        }

        // A resumed run keeps the deadline recorded when the gate first opened
        let now = SagaContext::now_millis();
        let window = match self.replay.approval_deadline_millis {
            Some(deadline_millis) => Duration::from_millis(deadline_millis.saturating_sub(now)),
            None => {
                let window = self.saga.options.approval_time;
                let deadline_millis = now.saturating_add(window.as_millis() as u64);
                self.record(SagaEvent::ApprovalWaiting { deadline_millis })?;
                window
            }
        };

        let mut approved = self.state.subscribe_approval();
        self.state.open_approval_window(PROGRESS_AWAITING_APPROVAL)?;
        self.saga.observer.on_approval_waiting(&self.context, seconds);
        tracing::info!(
            run_id = %self.context.run_id,
            remaining_ms = window.as_millis() as u64,
            "Waiting for approval"
        );

        let wait = async { approved.wait_for(|approved| *approved).await.map(|_| ()) };
        let in_time = matches!(tokio::time::timeout(window, wait).await, Ok(Ok(())));

        // Close the gate under the state lock; an approval latched before it wins
        if !in_time && !self.state.close_approval_window() {
            SagaStats::incr(&self.saga.stats.approvals_timed_out);
            self.saga.observer.on_approval_timed_out(&self.context, seconds);
            self.record(SagaEvent::ApprovalTimedOut { seconds })?;
            return Err(SagaError::ApprovalTimeout { seconds });
        }

        SagaStats::incr(&self.saga.stats.approvals_received);
        self.saga.observer.on_approval_received(&self.context);
        self.record(SagaEvent::ApprovalReceived)?;
        self.state.checkpoint(PROGRESS_AWAITING_APPROVAL, TransferState::Running);
        Ok(())
    }

    /// Undo the withdraw after a failed deposit and build the run's failure
    async fn compensate(&self, deposit_error: ActivityError) -> SagaError {
        let step = TransferStep::UndoWithdraw;
        if let Err(e) = self.state.transition(SagaPhase::Compensating) {
            tracing::warn!(run_id = %self.context.run_id, error = %e, "Compensating outside the deposit phase");
        }

        SagaStats::incr(&self.saga.stats.compensations_started);
        self.saga.observer.on_compensation_started(&self.context, step);
        self.record_best_effort(SagaEvent::CompensationStarted);

        let activities = &self.saga.activities;
        let amount = self.request.amount;
        let undone = self
            .activity(step, |_| activities.undo_withdraw(amount))
            .await
            .and_then(|undone| {
                if undone {
                    Ok(())
                } else {
                    Err(SagaError::Activity {
                        step,
                        attempts: 1,
                        source: ActivityError::terminal("CompensationRejected", "Undo withdraw was not applied"),
                    })
                }
            });

        match undone {
            Ok(()) => {
                SagaStats::incr(&self.saga.stats.compensations_completed);
                self.saga.observer.on_compensation_completed(&self.context, step);
                self.record_best_effort(SagaEvent::CompensationCompleted);
                SagaError::DepositFailed {
                    source: deposit_error,
                }
            }
            Err(SagaError::Activity { source, .. }) => {
                SagaStats::incr(&self.saga.stats.compensations_failed);
                self.saga
                    .observer
                    .on_compensation_failed(&self.context, step, &source);
                self.record_best_effort(SagaEvent::CompensationFailed {
                    error: source.clone(),
                });
                SagaError::CompensationFailed {
                    deposit: deposit_error,
                    compensation: source,
                }
            }
            Err(other) => {
                tracing::error!(
                    run_id = %self.context.run_id,
                    deposit_error = %deposit_error,
                    error = %other,
                    "Compensation outcome unknown"
                );
                other
            }
        }
    }

    fn tag(&self, step: TransferStep) -> Result<(), SagaError> {
        if !self.context.scenario.hooks().tags_steps {
            return Ok(());
        }
        self.state
            .upsert_search_attribute(STEP_SEARCH_ATTRIBUTE, step.as_str());
        self.saga
            .observer
            .on_search_attribute(&self.context, STEP_SEARCH_ATTRIBUTE, step.as_str());
        if self.replay.completed(step).is_none() {
            self.record(SagaEvent::StepTagged { step })?;
        }
        Ok(())
    }

    async fn pause(&self, step: TransferStep, duration: Duration) {
        if duration.is_zero() || self.replay.completed(step).is_some() {
            return;
        }
        tokio::time::sleep(duration).await;
    }

    fn record(&self, event: SagaEvent) -> Result<u64, SagaError> {
        Ok(self.saga.journal.append(&self.context.run_id, event)?)
    }

    fn record_best_effort(&self, event: SagaEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.saga.journal.append(&self.context.run_id, event) {
            tracing::error!(run_id = %self.context.run_id, event = event_type, error = %e, "Failed to record history event");
        }
    }
}
