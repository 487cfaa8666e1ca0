//! Exclusion service
//!
//! Owns the storage cache and the in-memory pattern store. Matching runs
//! against the in-memory copy under a read lock; edits go to storage first and
//! then replace the copy. When the host reports that storage changed behind
//! our back, the changed keys are invalidated and the pattern list is reloaded
//! through [`SingleFlight`], so a burst of change events costs at most one
//! extra reload.

use mw_core::{url_to_pattern, Matcher, Pattern, PatternStore};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::backend::PersistentStore;
use crate::cache::Cache;
use crate::keys::{sanitize_keys, IntoKeys};
use crate::patterns::{add_pattern, load_patterns, remove_pattern, PatternListError, PATTERNS_KEY, SCHEMA_KEY};
use crate::single_flight::SingleFlight;

pub struct ExclusionService<S> {
    cache: Cache<S>,
    patterns: RwLock<PatternStore>,
    // Orders reloads against local edits so an older list never replaces a
    // newer one
    sync: Mutex<()>,
    reload: SingleFlight,
}

impl<S: PersistentStore> ExclusionService<S> {
    /// Service over `store` with an empty pattern list. Call
    /// [`ExclusionService::load`] before matching.
    pub fn new(store: S) -> Self {
        Self::with_cache(Cache::new(store))
    }

    pub fn with_cache(cache: Cache<S>) -> Self {
        Self {
            cache,
            patterns: RwLock::new(PatternStore::new()),
            sync: Mutex::new(()),
            reload: SingleFlight::new(),
        }
    }

    pub fn cache(&self) -> &Cache<S> {
        &self.cache
    }

    /// (Re)load the pattern list from storage.
    pub async fn load(&self) -> Result<(), PatternListError> {
        let _sync = self.sync.lock().await;
        let store = load_patterns(&self.cache).await?;
        log::debug!("loaded {} patterns", store.len());
        *self.patterns.write() = store;
        Ok(())
    }

    pub fn includes_url(&self, url: &str) -> bool {
        let patterns = self.patterns.read();
        Matcher::new(&patterns).includes_url(url)
    }

    /// Copy of the current pattern list.
    pub fn patterns(&self) -> PatternStore {
        self.patterns.read().clone()
    }

    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }

    /// Add a pattern and persist the list. Returns `false` if it was present.
    pub async fn add(&self, pattern: Pattern) -> Result<bool, PatternListError> {
        let _sync = self.sync.lock().await;
        let (added, store) = add_pattern(&self.cache, pattern).await?;
        *self.patterns.write() = store;
        Ok(added)
    }

    /// Add the pattern matching exactly `url`.
    pub async fn add_url(&self, url: &str) -> Result<bool, PatternListError> {
        self.add(url_to_pattern(url)?).await
    }

    /// Remove the pattern at `index` (negative counts from the end) and
    /// persist the list.
    pub async fn remove_index(&self, index: isize) -> Result<Option<Pattern>, PatternListError> {
        let _sync = self.sync.lock().await;
        let (removed, store) = remove_pattern(&self.cache, index).await?;
        *self.patterns.write() = store;
        Ok(removed)
    }

    /// Handle a storage change notification for `keys`.
    ///
    /// Returns `Ok(true)` when this call performed a pattern reload.
    pub async fn on_storage_changed<K: IntoKeys>(&self, keys: K) -> Result<bool, PatternListError> {
        let keys = sanitize_keys(keys);
        self.cache.invalidate(&keys);

        if !keys.iter().any(|key| key == PATTERNS_KEY || key == SCHEMA_KEY) {
            return Ok(false);
        }
        self.reload
            .run(|| async {
                // A reload still in flight from an earlier event may have
                // refilled these
                self.cache.invalidate([PATTERNS_KEY, SCHEMA_KEY]);
                self.load().await
            })
            .await
    }
}
