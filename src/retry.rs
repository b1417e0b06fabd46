//! Retry policy applied around every activity invocation

use crate::ActivityError;
use std::future::Future;
use std::time::Duration;

/// Retry policy for activity execution
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Maximum delay cap
    pub maximum_interval: Duration,
    /// Backoff multiplier
    pub backoff_coefficient: f64,
    /// Error kinds never retried, even when reported as transient
    pub non_retryable_error_kinds: Vec<Box<str>>,
    /// Safety ceiling on attempts (`None` = unbounded)
    pub maximum_attempts: Option<u32>,
    /// Safety ceiling on time spent retrying one call
    pub maximum_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            maximum_interval: Duration::from_secs(30),
            backoff_coefficient: 2.0,
            non_retryable_error_kinds: vec![crate::errors::INVALID_ACCOUNT.into()],
            maximum_attempts: Some(10),
            maximum_elapsed: None,
        }
    }
}

/// What to do after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then reissue the call
    Retry(Duration),
    /// Error is non-retryable; propagate now
    Fail,
    /// Ceiling reached; propagate now
    Exhausted,
}

impl RetryDecision {
    /// Check if another attempt follows
    pub fn will_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

/// Failure propagated by the retry runner
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    /// Non-retryable error, surfaced on first occurrence
    #[error("non-retryable failure on attempt {attempts}: {source}")]
    NonRetryable {
        /// Attempts made
        attempts: u32,
        /// Error that stopped the call
        source: ActivityError,
    },
    /// Retry ceiling reached
    #[error("retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Last error seen
        source: ActivityError,
    },
}

impl RetryError {
    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            Self::NonRetryable { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The last activity error
    pub fn into_source(self) -> ActivityError {
        match self {
            Self::NonRetryable { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: Some(1),
            ..Self::default()
        }
    }

    /// Set the backoff intervals
    pub fn with_intervals(mut self, initial: Duration, maximum: Duration) -> Self {
        self.initial_interval = initial;
        self.maximum_interval = maximum;
        self
    }

    /// Set the attempt ceiling
    pub fn with_maximum_attempts(mut self, attempts: Option<u32>) -> Self {
        self.maximum_attempts = attempts;
        self
    }

    /// Set the elapsed-time ceiling
    pub fn with_maximum_elapsed(mut self, elapsed: Option<Duration>) -> Self {
        self.maximum_elapsed = elapsed;
        self
    }

    /// Mark an error kind as non-retryable
    pub fn with_non_retryable(mut self, kind: &str) -> Self {
        self.non_retryable_error_kinds.push(kind.into());
        self
    }

    /// Calculate delay after a given failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(attempt.saturating_sub(1) as i32);
        // Fields are public; a negative coefficient must not panic mid-retry
        let capped = delay.min(self.maximum_interval.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped).unwrap_or(self.maximum_interval)
    }

    /// Check if the policy treats this error as retryable
    pub fn is_retryable(&self, error: &ActivityError) -> bool {
        error.is_retryable()
            && !self
                .non_retryable_error_kinds
                .iter()
                .any(|kind| kind.as_ref() == error.kind())
    }

    /// Decide what follows a failed attempt
    pub fn decide(&self, error: &ActivityError, attempt: u32, elapsed: Duration) -> RetryDecision {
        if !self.is_retryable(error) {
            return RetryDecision::Fail;
        }
        if self.maximum_attempts.is_some_and(|max| attempt >= max) {
            return RetryDecision::Exhausted;
        }
        let delay = self.delay_for_attempt(attempt);
        if self
            .maximum_elapsed
            .is_some_and(|max| elapsed.saturating_add(delay) > max)
        {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry(delay)
    }

    /// Run `call` until it succeeds or the policy gives up.
    ///
    /// `call` receives the 1-indexed attempt number and must reissue the same
    /// logical operation (same idempotency key) on every attempt. `on_failure`
    /// sees each failed attempt together with the decision taken for it.
    pub async fn execute<T, F, Fut, O>(&self, mut call: F, mut on_failure: O) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
        O: FnMut(u32, &ActivityError, RetryDecision),
    {
        let started = tokio::time::Instant::now();
        let mut attempt = 1;

        loop {
            let error = match call(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let decision = self.decide(&error, attempt, started.elapsed());
            on_failure(attempt, &error, decision);

            match decision {
                RetryDecision::Retry(delay) => {
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying activity");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Fail => {
                    return Err(RetryError::NonRetryable {
                        attempts: attempt,
                        source: error,
                    })
                }
                RetryDecision::Exhausted => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: error,
                    })
                }
            }
        }
    }
}
