//! Write-through storage cache
//!
//! Mirrors part of a [`PersistentStore`] in memory. Reads pull only the keys
//! that are not cached yet, writes go to the store first and then to memory.
//! Entries written by someone else (another process or execution context)
//! are dropped with [`Cache::invalidate`] so the next read refetches them.
//! A fetch that was already in flight when a key was invalidated, removed or
//! cleared does not put its result for that key back into the cache.
//!
//! The cache never evicts. It is meant for a small, fixed key space such as
//! settings plus one pattern list; a larger key space needs an eviction
//! policy.
//!
//! Plain `get` followed by `set` is not atomic: another task may write the
//! same key in between. Use [`Cache::update`] or [`Cache::lock_key`] for
//! read-modify-write sequences.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::backend::{Entries, PersistentStore, StoreError};
use crate::keys::{sanitize_keys, IntoKeys};

/// Outcome of a read-modify-write step.
#[derive(Debug, Clone, PartialEq)]
pub enum Update<T> {
    /// Leave the stored value untouched.
    Keep(T),
    /// Write the new value through the cache.
    Write(Value, T),
}

/// Drop counters, read before a store fetch and compared after it.
#[derive(Debug, Clone, Default)]
struct Generations {
    // Bumped by a full clear
    epoch: u64,
    keys: HashMap<String, u64>,
}

impl Generations {
    fn of(&self, key: &str) -> u64 {
        self.keys.get(key).copied().unwrap_or(0)
    }
}

pub struct Cache<S> {
    store: S,
    entries: Mutex<HashMap<String, Value>>,
    generations: Mutex<Generations>,
    key_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<S: PersistentStore> Cache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
            generations: Mutex::new(Generations::default()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of cached entries.
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Sanitized keys that are not cached.
    pub fn not_in_cache<K: IntoKeys>(&self, keys: K) -> Vec<String> {
        let keys = sanitize_keys(keys);
        let entries = self.entries.lock();
        keys.into_iter().filter(|key| !entries.contains_key(key)).collect()
    }

    /// Cached entries for `keys`, without touching the store.
    pub fn unsynced_get<K: IntoKeys>(&self, keys: K) -> Entries {
        let keys = sanitize_keys(keys);
        let entries = self.entries.lock();
        keys.into_iter()
            .filter_map(|key| {
                let value = entries.get(&key)?.clone();
                Some((key, value))
            })
            .collect()
    }

    /// Drop every cached entry, without touching the store.
    pub fn unsynced_clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.generations.lock().epoch += 1;
    }

    /// Clear the store and the cache.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear().await?;
        self.unsynced_clear();
        Ok(())
    }

    /// Entries for `keys`, fetching the ones not cached yet. Keys missing
    /// from both cache and store are left out of the result.
    pub async fn get<K: IntoKeys>(&self, keys: K) -> Result<Entries, StoreError> {
        let keys = sanitize_keys(keys);

        let missing = self.not_in_cache(&keys);
        if missing.is_empty() {
            return Ok(self.unsynced_get(&keys));
        }

        log::debug!("fetching {} uncached keys: {:?}", missing.len(), missing);
        let seen = self.generations_of(&missing);
        let fetched = self.store.get(Some(missing.as_slice())).await?;
        self.merge_fetched(&fetched, &seen);

        // Values that were not merged still answer this call
        let mut result = self.unsynced_get(&keys);
        for (key, value) in fetched {
            result.entry(key).or_insert(value);
        }
        Ok(result)
    }

    /// Fetch the whole store, merge it into the cache and return the cache.
    /// Cached keys the store no longer has are kept.
    pub async fn get_all(&self) -> Result<Entries, StoreError> {
        let seen = self.generations.lock().clone();
        let fetched = self.store.get(None).await?;
        self.merge_fetched(&fetched, &seen);

        let mut result: Entries = self
            .entries
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in fetched {
            result.entry(key).or_insert(value);
        }
        Ok(result)
    }

    /// Write through to the store, then update the cache.
    pub async fn set(&self, entries: Entries) -> Result<(), StoreError> {
        self.store.set(&entries).await?;
        self.merge(entries);
        Ok(())
    }

    /// Remove from the store, then from the cache.
    pub async fn remove<K: IntoKeys>(&self, keys: K) -> Result<(), StoreError> {
        let keys = sanitize_keys(keys);
        self.store.remove(&keys).await?;

        let mut entries = self.entries.lock();
        for key in &keys {
            entries.remove(key);
        }
        self.bump(&keys);
        Ok(())
    }

    /// Forget cached entries so the next read goes to the store.
    pub fn invalidate<K: IntoKeys>(&self, keys: K) {
        let keys = sanitize_keys(keys);
        let mut entries = self.entries.lock();
        for key in &keys {
            if entries.remove(key).is_some() {
                log::debug!("invalidated cached key {:?}", key);
            }
        }
        self.bump(&keys);
    }

    /// Single value, fetched if needed.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.get(key).await?.remove(key))
    }

    /// Single value decoded into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get_value(key)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    /// Write a single value through the cache.
    pub async fn set_value(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = Entries::new();
        entries.insert(key.to_string(), value);
        self.set(entries).await
    }

    /// Exclusive access to `key` for a read-modify-write sequence.
    ///
    /// Only callers that take the lock are serialized against each other.
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.key_locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Read `key`, let `f` decide on a new value, and write it back, with
    /// other `update` calls on the same key held off until it is done.
    pub async fn update<T, E, F>(&self, key: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(Option<Value>) -> Result<Update<T>, E>,
        E: From<StoreError>,
    {
        let _guard = self.lock_key(key).await;

        let current = self.get_value(key).await?;
        match f(current)? {
            Update::Keep(result) => Ok(result),
            Update::Write(value, result) => {
                self.set_value(key, value).await?;
                Ok(result)
            }
        }
    }

    fn merge(&self, fetched: Entries) {
        let mut entries = self.entries.lock();
        for (key, value) in fetched {
            entries.insert(key, value);
        }
    }

    /// Merge store results, skipping keys dropped since `seen` was taken.
    fn merge_fetched(&self, fetched: &Entries, seen: &Generations) {
        let mut entries = self.entries.lock();
        let now = self.generations.lock();
        if now.epoch != seen.epoch {
            log::debug!("cache cleared during fetch, dropping {} fetched keys", fetched.len());
            return;
        }
        for (key, value) in fetched {
            if now.of(key) != seen.of(key) {
                log::debug!("dropping stale fetch of key {:?}", key);
                continue;
            }
            entries.insert(key.clone(), value.clone());
        }
    }

    fn generations_of(&self, keys: &[String]) -> Generations {
        let generations = self.generations.lock();
        Generations {
            epoch: generations.epoch,
            keys: keys.iter().map(|key| (key.clone(), generations.of(key))).collect(),
        }
    }

    fn bump(&self, keys: &[String]) {
        let mut generations = self.generations.lock();
        for key in keys {
            *generations.keys.entry(key.clone()).or_insert(0) += 1;
        }
    }
}
