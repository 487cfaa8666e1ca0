//! Persistent key/value store contract
//!
//! The host supplies an asynchronous JSON key/value store. Every primitive
//! has a default implementation (no-op, or an empty result for `get`), so a
//! backend only overrides what it actually supports and [`NoStore`] gives a
//! memory-only cache.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Key/value entries as exchanged with a store.
pub type Entries = Map<String, Value>;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Remove every entry.
    async fn clear(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Entries for `keys`, or the whole store for `None`. Missing keys are
    /// omitted from the result.
    async fn get(&self, _keys: Option<&[String]>) -> Result<Entries, StoreError> {
        Ok(Entries::new())
    }

    async fn remove(&self, _keys: &[String]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set(&self, _entries: &Entries) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl<T: PersistentStore + ?Sized> PersistentStore for Arc<T> {
    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }

    async fn get(&self, keys: Option<&[String]>) -> Result<Entries, StoreError> {
        (**self).get(keys).await
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        (**self).remove(keys).await
    }

    async fn set(&self, entries: &Entries) -> Result<(), StoreError> {
        (**self).set(entries).await
    }
}

// =============================================================================
// Built-in Stores
// =============================================================================

/// Store with no backing at all. Reads come back empty, writes vanish.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStore;

#[async_trait]
impl PersistentStore for NoStore {}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Entries) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Entries {
        self.entries.lock().clone()
    }
}

/// Pick `keys` out of `entries`, or everything for `None`.
pub(crate) fn select(entries: &Entries, keys: Option<&[String]>) -> Entries {
    match keys {
        None => entries.clone(),
        Some(keys) => keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect(),
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.lock().clear();
        Ok(())
    }

    async fn get(&self, keys: Option<&[String]>) -> Result<Entries, StoreError> {
        Ok(select(&self.entries.lock(), keys))
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set(&self, entries: &Entries) -> Result<(), StoreError> {
        let mut stored = self.entries.lock();
        for (key, value) in entries {
            stored.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(value: Value) -> Entries {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_no_store_defaults() {
        let store = NoStore;
        store.set(&entries(json!({"a": 1}))).await.unwrap();
        assert!(store.get(None).await.unwrap().is_empty());
        store.remove(&["a".to_string()]).await.unwrap();
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        store.set(&entries(json!({"a": "a", "b": "b"}))).await.unwrap();

        let got = store.get(Some(&["a".to_string(), "missing".to_string()][..])).await.unwrap();
        assert_eq!(Value::Object(got), json!({"a": "a"}));

        store.remove(&["a".to_string()]).await.unwrap();
        assert_eq!(Value::Object(store.get(None).await.unwrap()), json!({"b": "b"}));

        store.clear().await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_shared_store() {
        let store = Arc::new(MemoryStore::new());
        let handle: Arc<dyn PersistentStore> = store.clone();
        handle.set(&entries(json!({"k": true}))).await.unwrap();
        assert_eq!(store.snapshot().get("k"), Some(&json!(true)));
    }
}
