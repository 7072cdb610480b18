//! Persistence boundary for the TonConnect bridge.
//!
//! The host application owns the storage engine. The bridge only needs a
//! string-keyed, string-valued map, expressed as [`KeyValueStore`]. Typed
//! state (connected apps, connections, pending requests) is layered on top in
//! the `bridge` crate as JSON documents under well-known keys.
//!
//! # Design Principles
//!
//! - **Synchronous and small.** Every call is a single key read or write;
//!   atomic read-modify-write sequences are serialized by the caller.
//! - **Missing keys are not errors.** `get` returns `Ok(None)`.
//! - **Error type covers real failures.** Backend loss and corrupt values --
//!   not input validation.

mod error;

pub use error::StorageError;

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use serde::de::DeserializeOwned;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// String key-value store provided by the host.
///
/// Implementations must be `Send + Sync`; the bridge reads and writes from
/// its watcher task and from UI-driven calls concurrently.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes `key`. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Reads and decodes a JSON document. A missing key yields `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encodes `value` as JSON and writes it under `key`.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

// ---------------------------------------------------------------------------
// InMemoryKeyValueStore
// ---------------------------------------------------------------------------

/// In-memory store backed by `RwLock<HashMap>`.
///
/// Suitable for development and testing. For production, implement
/// [`KeyValueStore`] over the platform's persistent storage.
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
