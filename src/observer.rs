//! Saga observer trait

use crate::{ActivityError, SagaContext, SagaError, TransferStep};

/// Observer trait for external observability
pub trait SagaObserver: Send + Sync + 'static {
    /// Run started or resumed
    fn on_saga_started(&self, context: &SagaContext);
    /// Activity attempt started
    fn on_step_started(&self, context: &SagaContext, step: TransferStep, attempt: u32);
    /// Activity returned successfully
    fn on_step_completed(&self, context: &SagaContext, step: TransferStep, attempts: u32, duration_millis: u64);
    /// Activity attempt failed
    fn on_step_failed(&self, context: &SagaContext, step: TransferStep, attempt: u32, error: &ActivityError, will_retry: bool);
    /// Search attribute upserted
    fn on_search_attribute(&self, context: &SagaContext, key: &str, value: &str);
    /// Approval gate opened
    fn on_approval_waiting(&self, context: &SagaContext, approval_time_secs: u64);
    /// Approval latched in time
    fn on_approval_received(&self, context: &SagaContext);
    /// Approval window elapsed
    fn on_approval_timed_out(&self, context: &SagaContext, approval_time_secs: u64);
    /// Compensation started
    fn on_compensation_started(&self, context: &SagaContext, step: TransferStep);
    /// Compensation succeeded
    fn on_compensation_completed(&self, context: &SagaContext, step: TransferStep);
    /// Compensation failed
    fn on_compensation_failed(&self, context: &SagaContext, step: TransferStep, error: &ActivityError);
    /// Run finished successfully
    fn on_saga_completed(&self, context: &SagaContext);
    /// Run failed
    fn on_saga_failed(&self, context: &SagaContext, error: &SagaError);
}

/// No-op observer
pub struct NoOpObserver;

impl SagaObserver for NoOpObserver {
    fn on_saga_started(&self, _context: &SagaContext) {}
    fn on_step_started(&self, _context: &SagaContext, _step: TransferStep, _attempt: u32) {}
    fn on_step_completed(&self, _context: &SagaContext, _step: TransferStep, _attempts: u32, _duration_millis: u64) {}
    fn on_step_failed(&self, _context: &SagaContext, _step: TransferStep, _attempt: u32, _error: &ActivityError, _will_retry: bool) {}
    fn on_search_attribute(&self, _context: &SagaContext, _key: &str, _value: &str) {}
    fn on_approval_waiting(&self, _context: &SagaContext, _approval_time_secs: u64) {}
    fn on_approval_received(&self, _context: &SagaContext) {}
    fn on_approval_timed_out(&self, _context: &SagaContext, _approval_time_secs: u64) {}
    fn on_compensation_started(&self, _context: &SagaContext, _step: TransferStep) {}
    fn on_compensation_completed(&self, _context: &SagaContext, _step: TransferStep) {}
    fn on_compensation_failed(&self, _context: &SagaContext, _step: TransferStep, _error: &ActivityError) {}
    fn on_saga_completed(&self, _context: &SagaContext) {}
    fn on_saga_failed(&self, _context: &SagaContext, _error: &SagaError) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl SagaObserver for TracingObserver {
    fn on_saga_started(&self, context: &SagaContext) {
        tracing::info!(run_id = %context.run_id, scenario = %context.scenario, "Saga started");
    }

    fn on_step_started(&self, context: &SagaContext, step: TransferStep, attempt: u32) {
        tracing::info!(run_id = %context.run_id, step = %step, attempt, "Step started");
    }

    fn on_step_completed(&self, context: &SagaContext, step: TransferStep, attempts: u32, duration_millis: u64) {
        tracing::info!(run_id = %context.run_id, step = %step, attempts, duration_ms = duration_millis, "Step completed");
    }

    fn on_step_failed(&self, context: &SagaContext, step: TransferStep, attempt: u32, error: &ActivityError, will_retry: bool) {
        tracing::warn!(run_id = %context.run_id, step = %step, attempt, kind = error.kind(), error = %error, will_retry, "Step failed");
    }

    fn on_search_attribute(&self, context: &SagaContext, key: &str, value: &str) {
        tracing::debug!(run_id = %context.run_id, key, value, "Search attribute upserted");
    }

    fn on_approval_waiting(&self, context: &SagaContext, approval_time_secs: u64) {
        tracing::info!(run_id = %context.run_id, approval_time_secs, "Waiting for approval");
    }

    fn on_approval_received(&self, context: &SagaContext) {
        tracing::info!(run_id = %context.run_id, "Approval received");
    }

    fn on_approval_timed_out(&self, context: &SagaContext, approval_time_secs: u64) {
        tracing::warn!(run_id = %context.run_id, approval_time_secs, "Approval not received in time");
    }

    fn on_compensation_started(&self, context: &SagaContext, step: TransferStep) {
        tracing::info!(run_id = %context.run_id, step = %step, "Compensation started");
    }

    fn on_compensation_completed(&self, context: &SagaContext, step: TransferStep) {
        tracing::info!(run_id = %context.run_id, step = %step, "Compensation completed");
    }

    fn on_compensation_failed(&self, context: &SagaContext, step: TransferStep, error: &ActivityError) {
        tracing::error!(run_id = %context.run_id, step = %step, error = %error, "Compensation failed, manual remediation required");
    }

    fn on_saga_completed(&self, context: &SagaContext) {
        tracing::info!(run_id = %context.run_id, elapsed_ms = context.elapsed_millis(), "Saga completed");
    }

    fn on_saga_failed(&self, context: &SagaContext, error: &SagaError) {
        tracing::error!(run_id = %context.run_id, recoverable = error.is_recoverable(), reason = %error, "Saga failed");
    }
}
