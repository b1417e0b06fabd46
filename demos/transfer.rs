//! Money Transfer Example
//!
//! Runs the transfer saga for one scenario, or for every scenario when no
//! argument is given:
//!
//! ```text
//! cargo run --example transfer -- requires-approval
//! cargo run --example transfer -- AccountTransferWorkflowAPIDowntime
//! ```
//!
//! Settings come from `TRANSFER_*` environment variables (see `WorkerConfig`).
//! With `TRANSFER_ENCRYPT_PAYLOADS=true` the run history is stored encrypted.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use transfer_saga::{
    InMemoryJournal, RunId, SagaError, SagaOptions, ScenarioType, SimulatedActivities,
    TransferClient, TransferRequest, TransferSaga, TransferState, WorkerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = WorkerConfig::from_env()?;
    tracing::info!(
        address = %config.address,
        namespace = %config.namespace,
        task_queue = %config.task_queue,
        encrypt_payloads = config.encrypt_payloads,
        "Starting money transfer example"
    );

    // Storage (in-memory, optionally encrypted at rest)
    let journal = match config.codec()? {
        Some(codec) => InMemoryJournal::new().with_codec(Arc::new(codec)),
        None => InMemoryJournal::new(),
    };

    let activities = Arc::new(SimulatedActivities::new(config.simulated_delay()));
    let saga = TransferSaga::new(activities)
        .with_journal(Arc::new(journal))
        .with_options(config.saga_options());
    let mut client = TransferClient::new(saga);

    let scenarios: Vec<ScenarioType> = match std::env::args().nth(1) {
        Some(arg) => vec![arg.parse()?],
        None => ScenarioType::ALL.to_vec(),
    };

    for scenario in scenarios {
        run_scenario(&mut client, scenario).await?;
    }

    for row in client.list() {
        tracing::info!(
            run_id = %row.run_id,
            workflow_type = row.workflow_type,
            progress = row.progress.progress_percentage,
            phase = %row.phase,
            "Transfer summary"
        );
    }

    Ok(())
}

async fn run_scenario(client: &mut TransferClient, scenario: ScenarioType) -> Result<(), SagaError> {
    let run_id = RunId::new(format!("{}-{}", scenario.workflow_type(), RunId::generate()));
    let request = TransferRequest::new(Decimal::new(100, 0), "account1", "account2");
    tracing::info!(run_id = %run_id, scenario = %scenario, "Requesting transfer");

    let handle = client.start_transfer(Some(run_id.clone()), request, scenario)?;

    if scenario.hooks().requires_approval {
        // Approver: poll until the run waits, then approve through the update
        while handle.status().transfer_state != TransferState::Waiting && !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        match handle.approve_update() {
            Ok(confirmation) => tracing::info!(run_id = %run_id, confirmation, "Approver"),
            Err(e) => tracing::warn!(run_id = %run_id, error = %e, "Approver"),
        }
    }

    match handle.result().await {
        Ok(output) => {
            tracing::info!(run_id = %run_id, charge_id = %output.deposit_result.charge_id, "Transfer complete");
        }
        Err(e) if e.is_recoverable() => {
            tracing::warn!(run_id = %run_id, error = %e, "Transfer stalled, deploying fix and resuming");
            let fixed = client
                .saga()
                .clone()
                .with_options(SagaOptions { simulated_bug: false, ..client.saga().options().clone() });
            client.set_saga(fixed);

            let output = client.resume(&run_id)?.result().await?;
            tracing::info!(run_id = %run_id, charge_id = %output.deposit_result.charge_id, "Transfer complete after fix");
        }
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "Transfer failed");
        }
    }

    Ok(())
}
