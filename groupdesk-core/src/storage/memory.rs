//! In-memory storage implementation

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use super::{KeyValueStore, StorageEvent, StorageResult, EVENT_CHANNEL_CAPACITY};

/// In-memory key-value store.
///
/// Wrap it in an `Arc` and hand clones to several session caches to model
/// browser tabs sharing one local storage.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, event: StorageEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.publish(StorageEvent::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let removed = self.entries.write().unwrap().remove(key);
        if removed.is_some() {
            self.publish(StorageEvent::Removed {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.events.subscribe())
    }
}
