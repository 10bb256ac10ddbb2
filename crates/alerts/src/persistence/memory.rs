//! In-memory implementation of DurableKvStore for testing

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::kv::{DurableKvStore, KvError};

/// In-memory implementation of [`DurableKvStore`]
///
/// This is primarily for testing. It is not durable across restarts, but a
/// single instance shared between two engines models "the disk" surviving a
/// restart of everything else.
///
/// # Example
///
/// ```
/// use chime_alerts::InMemoryKvStore;
///
/// let store = InMemoryKvStore::new();
/// assert!(store.is_empty());
/// ```
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Store raw bytes under a key (for injecting corrupt values in tests)
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.write().insert(key.into(), value.into());
    }

    /// Read raw bytes without going through the trait
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl DurableKvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, KvError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
