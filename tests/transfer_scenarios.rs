mod common;

use common::{request, saga, CountingActivities, FailingUndo, RecordingObserver};
use std::sync::Arc;
use std::time::Duration;
use transfer_saga::{
    HistoryJournal, InMemoryJournal, LedgerOperation, NoOpObserver, RetryPolicy, RunHistory, RunId,
    RunStatus, SagaError, SagaEvent, SagaOptions, SagaPhase, ScenarioType, StepPacing, TransferSaga, TransferState,
    TransferStep, API_UNAVAILABLE, INVALID_ACCOUNT, SIMULATED_CHARGE_ID, STEP_SEARCH_ATTRIBUTE,
};

fn events(journal: &InMemoryJournal, run_id: &RunId) -> Vec<SagaEvent> {
    journal
        .read(run_id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.event)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_normal_transfer_end_to_end() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let saga = saga(&activities, &journal);
    let run_id = RunId::from("AccountTransferWorkflow-1");

    let started = tokio::time::Instant::now();
    let handle = saga
        .start(run_id.clone(), request(), ScenarioType::Normal)
        .unwrap();
    let state = handle.state();
    let output = handle.result().await.unwrap();

    assert_eq!(output.deposit_result.charge_id, SIMULATED_CHARGE_ID);
    let progress = state.progress();
    assert_eq!(progress.progress_percentage, 100);
    assert_eq!(progress.transfer_state, TransferState::Finished);
    assert_eq!(progress.approval_time, 0);
    assert_eq!(progress.deposit_result.charge_id, SIMULATED_CHARGE_ID);
    assert_eq!(state.phase(), SagaPhase::Finished);

    // Four 1 s activity calls plus 1 + 3 + 1 + 1 s of pacing
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11), "{elapsed:?}");

    let output_json = serde_json::to_value(&output).unwrap();
    assert_eq!(output_json["depositResult"]["chargeId"], "example-transfer-id");

    for step in [
        TransferStep::Validate,
        TransferStep::Withdraw,
        TransferStep::Deposit,
        TransferStep::SendNotification,
    ] {
        assert_eq!(activities.calls(step), 1, "{step}");
    }
    assert_eq!(activities.calls(TransferStep::UndoWithdraw), 0);

    let history = events(&journal, &run_id);
    assert!(matches!(history.first(), Some(SagaEvent::SagaStarted { .. })));
    assert!(matches!(history.last(), Some(SagaEvent::SagaCompleted { .. })));
    assert_eq!(saga.stats().runs_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_checkpoints_are_monotonic() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let handle = saga(&activities, &journal)
        .start(RunId::generate(), request(), ScenarioType::Normal)
        .unwrap();

    let mut seen = Vec::new();
    while !handle.is_finished() {
        let progress = handle.status();
        if seen.last() != Some(&progress.progress_percentage) {
            seen.push(progress.progress_percentage);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    seen.push(handle.status().progress_percentage);
    seen.dedup();

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    for checkpoint in [10, 25, 50, 75, 100] {
        assert!(seen.contains(&checkpoint), "missing {checkpoint} in {seen:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_advanced_visibility_tags_each_step() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let observer = Arc::new(RecordingObserver::default());
    let saga = saga(&activities, &journal).with_observer(observer.clone());
    let run_id = RunId::generate();

    let handle = saga
        .start(run_id.clone(), request(), ScenarioType::AdvancedVisibility)
        .unwrap();
    let state = handle.state();
    handle.result().await.unwrap();

    let tags: Vec<String> = observer
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("search_attribute:"))
        .collect();
    assert_eq!(
        tags,
        vec![
            "search_attribute:Step=Validate",
            "search_attribute:Step=Withdraw",
            "search_attribute:Step=Deposit",
            "search_attribute:Step=SendNotification",
        ]
    );
    assert_eq!(
        state.search_attribute(STEP_SEARCH_ATTRIBUTE).as_deref(),
        Some("SendNotification")
    );

    let tagged = events(&journal, &run_id)
        .into_iter()
        .filter(|e| matches!(e, SagaEvent::StepTagged { .. }))
        .count();
    assert_eq!(tagged, 4);
}

#[tokio::test(start_paused = true)]
async fn test_other_scenarios_do_not_tag() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let handle = saga(&activities, &journal)
        .start(RunId::generate(), request(), ScenarioType::Normal)
        .unwrap();
    let state = handle.state();
    handle.result().await.unwrap();
    assert!(state.search_attributes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_downtime_recovers_by_retrying_withdraw() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let observer = Arc::new(RecordingObserver::default());
    let saga = saga(&activities, &journal).with_observer(observer.clone());
    let run_id = RunId::generate();

    let handle = saga
        .start(run_id.clone(), request(), ScenarioType::SimulatedDowntime)
        .unwrap();
    let state = handle.state();
    let output = handle.result().await.unwrap();

    assert_eq!(output.deposit_result.charge_id, SIMULATED_CHARGE_ID);
    assert_eq!(state.progress().transfer_state, TransferState::Finished);
    assert_eq!(activities.calls(TransferStep::Withdraw), 5);
    assert_eq!(activities.ledger().count(LedgerOperation::Withdraw), 1);

    // Every retry reused the run's single idempotency key
    let keys = activities.keys();
    assert!(keys.windows(2).all(|w| w[0] == w[1]));

    let failures: Vec<(u32, bool)> = events(&journal, &run_id)
        .into_iter()
        .filter_map(|e| match e {
            SagaEvent::ActivityFailed { step: TransferStep::Withdraw, attempt, error, will_retry } => {
                assert_eq!(error.kind(), API_UNAVAILABLE);
                Some((attempt, will_retry))
            }
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![(1, true), (2, true), (3, true), (4, true)]);
    assert!(observer
        .calls()
        .contains(&"step_completed:Withdraw:5".to_string()));

    let stats = saga.stats();
    assert_eq!(stats.activity_retries, 4);
    assert_eq!(stats.runs_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_account_compensates_once() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let saga = saga(&activities, &journal);
    let run_id = RunId::generate();

    let handle = saga
        .start(run_id.clone(), request(), ScenarioType::InvalidAccount)
        .unwrap();
    let state = handle.state();
    let err = handle.result().await.unwrap_err();

    match &err {
        SagaError::DepositFailed { source } => assert_eq!(source.kind(), INVALID_ACCOUNT),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.to_string(), "Deposit failed: Deposit activity failed, account is invalid");
    assert!(!err.is_recoverable());

    // Terminal error: deposit tried once, undo exactly once
    assert_eq!(activities.calls(TransferStep::Deposit), 1);
    assert_eq!(activities.calls(TransferStep::UndoWithdraw), 1);

    let ledger = activities.ledger();
    assert_eq!(ledger.count(LedgerOperation::Withdraw), 1);
    assert_eq!(ledger.count(LedgerOperation::Deposit), 0);
    assert_eq!(ledger.count(LedgerOperation::UndoWithdraw), 1);

    assert_eq!(state.phase(), SagaPhase::Failed);
    assert_eq!(state.progress().progress_percentage, 50);
    assert!(state.progress().deposit_result.is_empty());

    let history = events(&journal, &run_id);
    assert!(history.contains(&SagaEvent::CompensationStarted));
    assert!(history.contains(&SagaEvent::CompensationCompleted));
    assert!(matches!(
        history.last(),
        Some(SagaEvent::SagaFailed { recoverable: false, .. })
    ));

    let stats = saga.stats();
    assert_eq!(stats.compensations_started, 1);
    assert_eq!(stats.compensations_completed, 1);
    assert_eq!(stats.runs_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_compensation_failure_is_distinct() {
    common::init_tracing();
    let activities = Arc::new(FailingUndo(CountingActivities::new()));
    let saga = TransferSaga::new(activities.clone());

    let err = saga
        .start(RunId::generate(), request(), ScenarioType::InvalidAccount)
        .unwrap()
        .result()
        .await
        .unwrap_err();

    match &err {
        SagaError::CompensationFailed { deposit, compensation } => {
            assert_eq!(deposit.kind(), INVALID_ACCOUNT);
            assert_eq!(compensation.kind(), "LedgerClosed");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.needs_manual_remediation());
    assert_eq!(activities.0.calls(TransferStep::UndoWithdraw), 1);
    assert_eq!(saga.stats().compensations_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_bug_stalls_after_withdraw() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let saga = saga(&activities, &journal);
    let run_id = RunId::generate();

    let handle = saga
        .start(run_id.clone(), request(), ScenarioType::SimulatedBug)
        .unwrap();
    let state = handle.state();
    let err = handle.result().await.unwrap_err();

    assert!(err.is_recoverable());
    assert!(err.to_string().contains("Simulated bug - fix me!"));
    assert_eq!(state.progress().progress_percentage, 50);
    assert_eq!(activities.calls(TransferStep::Deposit), 0);
    // No compensation for workflow bugs
    assert_eq!(activities.calls(TransferStep::UndoWithdraw), 0);
    assert!(matches!(
        events(&journal, &run_id).last(),
        Some(SagaEvent::SagaFailed { recoverable: true, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_run_id_is_rejected() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let saga = saga(&activities, &journal);
    let run_id = RunId::from("transfer-42");

    let first = saga
        .start(run_id.clone(), request(), ScenarioType::Normal)
        .unwrap();
    let second = saga.start(run_id.clone(), request(), ScenarioType::Normal);
    assert!(matches!(second, Err(SagaError::AlreadyStarted(id)) if id == run_id));

    first.result().await.unwrap();
    assert_eq!(activities.calls(TransferStep::Withdraw), 1);
}

#[tokio::test(start_paused = true)]
async fn test_negative_amount_fails_validation() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let bad = transfer_saga::TransferRequest::new(rust_decimal_macros::dec!(-5), "account1", "account2");

    let err = saga(&activities, &journal)
        .start(RunId::generate(), bad, ScenarioType::Normal)
        .unwrap()
        .result()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SagaError::Activity { step: TransferStep::Validate, attempts: 1, .. }
    ));
    assert_eq!(activities.calls(TransferStep::Withdraw), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_approval() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let saga = saga(&activities, &journal);
    let run_id = RunId::generate();

    let handle = saga
        .start(run_id.clone(), request(), ScenarioType::RequiresApproval)
        .unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.status().transfer_state, TransferState::Waiting);

    assert!(handle.cancel().unwrap());
    assert!(!handle.cancel().unwrap());
    assert_eq!(handle.phase(), SagaPhase::Failed);
    assert!(matches!(handle.result().await, Err(SagaError::Cancelled)));

    assert_eq!(events(&journal, &run_id).last(), Some(&SagaEvent::SagaCancelled));
    assert_eq!(activities.calls(TransferStep::Withdraw), 0);
    assert!(matches!(
        saga.resume(run_id),
        Err(SagaError::NotResumable { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_completion_leaves_history_alone() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let run_id = RunId::generate();
    let handle = saga(&activities, &journal)
        .start(run_id.clone(), request(), ScenarioType::Normal)
        .unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(handle.is_finished());
    assert!(!handle.cancel().unwrap());
    handle.result().await.unwrap();

    let entries = journal.read(&run_id).unwrap();
    assert!(matches!(entries.last().map(|e| &e.event), Some(SagaEvent::SagaCompleted { .. })));
    assert_eq!(RunHistory::rebuild(&entries).status, RunStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_outage_without_retries_fails_on_first_attempt() {
    let activities = Arc::new(CountingActivities::new());
    let journal = Arc::new(InMemoryJournal::new());
    let options = SagaOptions::default()
        .with_retry_policy(RetryPolicy::no_retry())
        .with_pacing(StepPacing::none());
    let saga = saga(&activities, &journal)
        .with_observer(Arc::new(NoOpObserver))
        .with_options(options);

    let started = tokio::time::Instant::now();
    let err = saga
        .start(RunId::generate(), request(), ScenarioType::SimulatedDowntime)
        .unwrap()
        .result()
        .await
        .unwrap_err();

    match err {
        SagaError::Activity { step, attempts, source } => {
            assert_eq!(step, TransferStep::Withdraw);
            assert_eq!(attempts, 1);
            assert_eq!(source.kind(), API_UNAVAILABLE);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Validate and one withdraw attempt, no pacing
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(activities.calls(TransferStep::Withdraw), 1);
    // Withdraw never succeeded, so nothing to compensate
    assert_eq!(activities.calls(TransferStep::UndoWithdraw), 0);
    assert_eq!(saga.stats().activity_retries, 0);
}
