//! Idempotency store for side-effecting activities

use crate::IdempotencyKey;

/// Deduplication storage trait
pub trait IdempotencyStore: Send + Sync + 'static {
    /// Mark `key` as applied; `true` if it was not applied before
    fn check_and_mark(&self, key: &IdempotencyKey) -> Result<bool, DedupeError>;
    /// Check if `key` was applied
    fn contains(&self, key: &IdempotencyKey) -> bool;
}

/// Error from the idempotency store
#[derive(Debug, thiserror::Error)]
pub enum DedupeError {
    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(Box<str>),
}

/// In-memory idempotency store
pub struct InMemoryIdempotencyStore {
    data: std::sync::RwLock<std::collections::HashSet<IdempotencyKey>>,
}

impl InMemoryIdempotencyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            data: std::sync::RwLock::new(std::collections::HashSet::new()),
        }
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn check_and_mark(&self, key: &IdempotencyKey) -> Result<bool, DedupeError> {
        let mut data = self.data.write().map_err(|e| DedupeError::Storage(e.to_string().into()))?;
        Ok(data.insert(key.clone()))
    }

    fn contains(&self, key: &IdempotencyKey) -> bool {
        let data = self.data.read().ok();
        data.map(|d| d.contains(key)).unwrap_or(false)
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}
