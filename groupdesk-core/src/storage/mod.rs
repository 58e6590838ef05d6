//! Key-value storage backing the session cache
//!
//! Mirrors the shape of browser local storage: synchronous, string keys,
//! string values, and change notifications that other holders of the same
//! store can listen to.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Capacity of the change-event channel each store keeps
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No persistent storage in this runtime (e.g. non-interactive rendering)
    #[error("Storage unavailable")]
    Unavailable,

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A change made to a store, delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    Set { key: String, value: String },
    Removed { key: String },
}

impl StorageEvent {
    pub fn key(&self) -> &str {
        match self {
            StorageEvent::Set { key, .. } | StorageEvent::Removed { key } => key,
        }
    }
}

/// Trait for string key-value storage
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// List all keys starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Subscribe to changes, if this store publishes them
    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        None
    }
}

/// Allow sharing one store between several caches
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        (**self).keys_with_prefix(prefix)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        (**self).subscribe()
    }
}

/// Store for runtimes without persistent storage. Every call fails with
/// [`StorageError::Unavailable`], which the session cache treats as a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStore;

impl KeyValueStore for UnavailableStore {
    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Unavailable)
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    fn keys_with_prefix(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Err(StorageError::Unavailable)
    }
}
