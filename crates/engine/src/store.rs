//! Durable key-value persistence.
//!
//! The engines persist their state as JSON strings under fixed namespace
//! keys, matching the browser-local storage contract they were built
//! against: `get` returns the raw string or nothing, `set` overwrites.
//! Missing or corrupt values always fall back to a default - persistence
//! problems are logged, never surfaced to the user.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from the backing store itself.
///
/// Engine code treats these as soft failures: a failed load falls back to
/// the default state, a failed save is logged and the in-memory state
/// remains authoritative.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A durable string-keyed store.
pub trait KeyValueStore {
    /// Fetch the raw value under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing store is unavailable.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing store is unavailable.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete the value under `key`. Absent keys are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing store is unavailable.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store, the default backing for per-visitor sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Load and deserialize the value under `key`, falling back to the type's
/// default on a missing value, a corrupt value, or an unavailable store.
pub fn load_or_default<T, S>(store: &S, key: &str) -> T
where
    T: DeserializeOwned + Default,
    S: KeyValueStore + ?Sized,
{
    match store.get(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Corrupt persisted value, falling back to default");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "Store unavailable, falling back to default");
            T::default()
        }
    }
}

/// Serialize and persist `value` under `key`, logging on failure.
pub fn persist<T, S>(store: &mut S, key: &str, value: &T)
where
    T: Serialize,
    S: KeyValueStore + ?Sized,
{
    match serde_json::to_string(value) {
        Ok(raw) => {
            if let Err(e) = store.set(key, &raw) {
                tracing::warn!(key, error = %e, "Failed to persist value");
            }
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to serialize value for persistence");
        }
    }
}
