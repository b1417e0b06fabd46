//! Idempotency key shared by the side-effecting steps of one run

use serde::{Deserialize, Serialize};

/// Idempotency key for deduplicating withdraw and deposit side effects
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub Box<str>);

impl IdempotencyKey {
    /// Generate a fresh random key; must be recorded before use so replay reuses it
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into_boxed_str())
    }

    /// Key under which one operation of one run is deduplicated
    pub fn scoped(&self, operation: &str) -> Self {
        Self(format!("{}:{}", self.0, operation).into_boxed_str())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_keys_differ_per_operation() {
        let key = IdempotencyKey::generate();
        assert_ne!(key.scoped("withdraw"), key.scoped("deposit"));
        assert_eq!(key.scoped("withdraw"), key.scoped("withdraw"));
    }
}
