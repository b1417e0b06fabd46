//! Worker configuration and per-saga options

use crate::{CodecError, EncryptionCodec, RetryPolicy, DEFAULT_KEY};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix (`TRANSFER_ADDRESS`, `TRANSFER_TASK_QUEUE`, ...)
pub const ENV_PREFIX: &str = "TRANSFER";

/// Error loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),
    /// Encryption settings are unusable
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Worker settings read from the environment.
///
/// Connection fields are passed through untouched to whatever hosts the
/// orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Substrate address
    #[serde(default = "default_address")]
    pub address: String,
    /// Substrate namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Task queue served by the worker
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
    /// TLS client certificate path
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,
    /// TLS client key path
    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,
    /// API key
    #[serde(default)]
    pub api_key: Option<String>,
    /// Encrypt payloads crossing the history boundary
    #[serde(default)]
    pub encrypt_payloads: bool,
    /// 32-byte encryption key; the built-in demo key when unset
    #[serde(default)]
    pub encrypt_key: Option<String>,
    /// Encryption key ID
    #[serde(default = "default_key_id")]
    pub encrypt_key_id: String,
    /// Approval window in seconds
    #[serde(default = "default_approval_time")]
    pub approval_time_secs: u64,
    /// Simulated activity latency in milliseconds
    #[serde(default = "default_simulated_delay")]
    pub simulated_delay_ms: u64,
}

fn default_address() -> String {
    "127.0.0.1:7233".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_task_queue() -> String {
    "MoneyTransfer".to_string()
}

fn default_key_id() -> String {
    crate::DEFAULT_KEY_ID.to_string()
}

fn default_approval_time() -> u64 {
    30
}

fn default_simulated_delay() -> u64 {
    1000
}

impl WorkerConfig {
    /// Load from `TRANSFER_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load from environment variables with a custom prefix
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix).try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Options for sagas run by this worker
    pub fn saga_options(&self) -> SagaOptions {
        SagaOptions::default().with_approval_time(Duration::from_secs(self.approval_time_secs))
    }

    /// Latency of simulated activities
    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    /// Payload codec, when encryption is enabled
    pub fn codec(&self) -> Result<Option<EncryptionCodec>, ConfigError> {
        if !self.encrypt_payloads {
            return Ok(None);
        }
        let key = match &self.encrypt_key {
            Some(key) => key.as_bytes(),
            None => DEFAULT_KEY.as_slice(),
        };
        Ok(Some(EncryptionCodec::new(&self.encrypt_key_id, key)?))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            namespace: default_namespace(),
            task_queue: default_task_queue(),
            tls_cert_path: None,
            tls_key_path: None,
            api_key: None,
            encrypt_payloads: false,
            encrypt_key: None,
            encrypt_key_id: default_key_id(),
            approval_time_secs: default_approval_time(),
            simulated_delay_ms: default_simulated_delay(),
        }
    }
}

/// Pauses after each step, before its progress checkpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepPacing {
    /// After validate
    pub after_validate: Duration,
    /// After withdraw
    pub after_withdraw: Duration,
    /// After deposit
    pub after_deposit: Duration,
    /// After send-notification
    pub after_notify: Duration,
}

impl StepPacing {
    /// No pauses
    pub fn none() -> Self {
        Self {
            after_validate: Duration::ZERO,
            after_withdraw: Duration::ZERO,
            after_deposit: Duration::ZERO,
            after_notify: Duration::ZERO,
        }
    }
}

impl Default for StepPacing {
    fn default() -> Self {
        Self {
            after_validate: Duration::from_secs(1),
            after_withdraw: Duration::from_secs(3),
            after_deposit: Duration::from_secs(1),
            after_notify: Duration::from_secs(1),
        }
    }
}

/// Options applied to every run of one orchestrator
#[derive(Clone, Debug)]
pub struct SagaOptions {
    /// Policy wrapped around every activity call
    pub retry_policy: RetryPolicy,
    /// Approval window
    pub approval_time: Duration,
    /// Pauses between steps
    pub pacing: StepPacing,
    /// Whether the simulated-bug scenario still fails after withdraw;
    /// turn off to deploy the fix and resume stalled runs
    pub simulated_bug: bool,
}

impl Default for SagaOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            approval_time: Duration::from_secs(30),
            pacing: StepPacing::default(),
            simulated_bug: true,
        }
    }
}

impl SagaOptions {
    /// Set the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the approval window
    pub fn with_approval_time(mut self, approval_time: Duration) -> Self {
        self.approval_time = approval_time;
        self
    }

    /// Set the step pacing
    pub fn with_pacing(mut self, pacing: StepPacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Enable or disable the simulated bug
    pub fn with_simulated_bug(mut self, enabled: bool) -> Self {
        self.simulated_bug = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        temp_env::with_vars_unset(
            [
                "TRANSFER_ADDRESS",
                "TRANSFER_TASK_QUEUE",
                "TRANSFER_ENCRYPT_PAYLOADS",
                "TRANSFER_APPROVAL_TIME_SECS",
            ],
            || {
                let config = WorkerConfig::from_env().unwrap();
                assert_eq!(config.address, "127.0.0.1:7233");
                assert_eq!(config.namespace, "default");
                assert_eq!(config.task_queue, "MoneyTransfer");
                assert!(!config.encrypt_payloads);
                assert_eq!(config.approval_time_secs, 30);
                assert!(config.codec().unwrap().is_none());
            },
        );
    }

    #[test]
    fn test_environment_overrides() {
        temp_env::with_vars(
            [
                ("TRANSFER_ADDRESS", Some("temporal.example:7233")),
                ("TRANSFER_TASK_QUEUE", Some("Transfers")),
                ("TRANSFER_APPROVAL_TIME_SECS", Some("5")),
                ("TRANSFER_SIMULATED_DELAY_MS", Some("10")),
                ("TRANSFER_ENCRYPT_PAYLOADS", Some("true")),
            ],
            || {
                let config = WorkerConfig::from_env().unwrap();
                assert_eq!(config.address, "temporal.example:7233");
                assert_eq!(config.task_queue, "Transfers");
                assert_eq!(config.saga_options().approval_time, Duration::from_secs(5));
                assert_eq!(config.simulated_delay(), Duration::from_millis(10));

                let codec = config.codec().unwrap().unwrap();
                assert_eq!(codec.key_id(), "test");
            },
        );
    }

    #[test]
    fn test_short_encryption_key_is_rejected() {
        let config = WorkerConfig {
            encrypt_payloads: true,
            encrypt_key: Some("too-short".into()),
            ..WorkerConfig::default()
        };
        assert!(matches!(config.codec(), Err(ConfigError::Codec(CodecError::InvalidKey(_)))));
    }

    #[test]
    fn test_pacing_none() {
        let options = SagaOptions::default().with_pacing(StepPacing::none());
        assert_eq!(options.pacing.after_withdraw, Duration::ZERO);
        assert_eq!(StepPacing::default().after_withdraw, Duration::from_secs(3));
    }
}
