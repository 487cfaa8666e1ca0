//! Persisted pattern list
//!
//! The exclusion list lives in the store under [`PATTERNS_KEY`] as a JSON
//! array of `[scheme, domainName, port, path]` arrays, with the format version
//! under [`SCHEMA_KEY`].
//!
//! Version 1 lists hold `[hostname, path, protocol]` triples. They are
//! converted once on load, re-sorted, and written back as version 2. A list
//! without a version marker is classified by the width of its entries, which
//! must be 3 or 4.

use mw_core::{Pattern, PatternError, PatternStore, UrlError, WILDCARD};
use serde_json::{json, Value};

use crate::backend::{Entries, PersistentStore, StoreError};
use crate::cache::Cache;

pub const PATTERNS_KEY: &str = "url-exclusion-list";
pub const SCHEMA_KEY: &str = "url-exclusion-list-schema";
pub const SCHEMA_VERSION: u64 = 2;

/// Error type for loading and editing the persisted list.
#[derive(Debug, thiserror::Error)]
pub enum PatternListError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Malformed pattern list: {0}")]
    Malformed(String),
    #[error("Unsupported pattern list schema version {0}")]
    UnsupportedSchema(u64),
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("Invalid URL: {0}")]
    Url(#[from] UrlError),
}

// =============================================================================
// Decoding
// =============================================================================

#[derive(Debug, PartialEq)]
enum Decoded {
    Current(Vec<Pattern>),
    Legacy(Vec<Pattern>),
}

fn schema_version(marker: Option<&Value>) -> Result<Option<u64>, PatternListError> {
    match marker {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            PatternListError::Malformed(format!("schema marker {} is not a version number", value))
        }),
    }
}

fn decode(list: Option<&Value>, marker: Option<&Value>) -> Result<Decoded, PatternListError> {
    let version = schema_version(marker)?;

    let rows: Vec<Vec<String>> = match list {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| PatternListError::Malformed(e.to_string()))?,
    };

    let width = match version {
        Some(1) => 3,
        Some(SCHEMA_VERSION) => 4,
        Some(other) => return Err(PatternListError::UnsupportedSchema(other)),
        None => match rows.first().map_or(4, Vec::len) {
            width @ (3 | 4) => width,
            other => {
                return Err(PatternListError::Malformed(format!(
                    "entry 0 has {} fields, expected 3 or 4",
                    other
                )))
            }
        },
    };

    if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
        return Err(PatternListError::Malformed(format!(
            "entry {} has {} fields, expected {}",
            index,
            row.len(),
            width
        )));
    }

    if width == 3 {
        let patterns = rows
            .into_iter()
            .map(|row| match <[String; 3]>::try_from(row) {
                Ok([hostname, path, protocol]) => Ok(Pattern::from_parts(protocol, hostname, WILDCARD.to_string(), path)),
                Err(row) => Err(row_width_error(&row, 3)),
            })
            .collect::<Result<_, _>>()?;
        Ok(Decoded::Legacy(patterns))
    } else {
        let patterns = rows
            .into_iter()
            .map(|row| match <[String; 4]>::try_from(row) {
                Ok([scheme, domain_name, port, path]) => Ok(Pattern::from_parts(scheme, domain_name, port, path)),
                Err(row) => Err(row_width_error(&row, 4)),
            })
            .collect::<Result<_, _>>()?;
        Ok(Decoded::Current(patterns))
    }
}

fn row_width_error(row: &[String], width: usize) -> PatternListError {
    PatternListError::Malformed(format!("entry {:?} has {} fields, expected {}", row, row.len(), width))
}

fn encode(store: &PatternStore) -> Result<Entries, PatternListError> {
    let mut entries = Entries::new();
    let list = serde_json::to_value(store.as_slice()).map_err(StoreError::from)?;
    entries.insert(PATTERNS_KEY.to_string(), list);
    entries.insert(SCHEMA_KEY.to_string(), json!(SCHEMA_VERSION));
    Ok(entries)
}

// =============================================================================
// Load / Save
// =============================================================================

/// Load the pattern list, migrating or repairing it in storage if needed.
pub async fn load_patterns<S: PersistentStore>(cache: &Cache<S>) -> Result<PatternStore, PatternListError> {
    let entries = cache.get([PATTERNS_KEY, SCHEMA_KEY]).await?;

    match decode(entries.get(PATTERNS_KEY), entries.get(SCHEMA_KEY))? {
        Decoded::Legacy(patterns) => {
            let count = patterns.len();
            let store = PatternStore::from_patterns(patterns)?;
            log::info!(
                "migrated {} legacy patterns to schema version {} ({} after dedup)",
                count,
                SCHEMA_VERSION,
                store.len()
            );
            save_patterns(cache, &store).await?;
            Ok(store)
        }
        Decoded::Current(patterns) => {
            let mut store = PatternStore::new();
            store.set(patterns);
            if store.is_well_formed() {
                return Ok(store);
            }

            log::warn!("stored pattern list is out of order, rebuilding {} entries", store.len());
            let store = PatternStore::from_patterns(store.into_vec())?;
            save_patterns(cache, &store).await?;
            Ok(store)
        }
    }
}

/// Write the list and the current schema marker through the cache.
pub async fn save_patterns<S: PersistentStore>(
    cache: &Cache<S>,
    store: &PatternStore,
) -> Result<(), PatternListError> {
    cache.set(encode(store)?).await?;
    Ok(())
}

/// Load, edit and save the list while holding the list's key lock.
///
/// `f` reports whether it changed anything; unchanged lists are not written.
pub async fn edit_patterns<S, T, F>(cache: &Cache<S>, f: F) -> Result<(T, PatternStore), PatternListError>
where
    S: PersistentStore,
    F: FnOnce(&mut PatternStore) -> Result<(T, bool), PatternListError>,
{
    let _guard = cache.lock_key(PATTERNS_KEY).await;

    let mut store = load_patterns(cache).await?;
    let (result, changed) = f(&mut store)?;
    if changed {
        save_patterns(cache, &store).await?;
    }
    Ok((result, store))
}

/// Add a pattern to the persisted list. Returns `false` if it was present.
pub async fn add_pattern<S: PersistentStore>(
    cache: &Cache<S>,
    pattern: Pattern,
) -> Result<(bool, PatternStore), PatternListError> {
    edit_patterns(cache, |store| {
        let added = store.add(pattern)?;
        Ok((added, added))
    })
    .await
}

/// Remove the pattern at `index` from the persisted list.
pub async fn remove_pattern<S: PersistentStore>(
    cache: &Cache<S>,
    index: isize,
) -> Result<(Option<Pattern>, PatternStore), PatternListError> {
    edit_patterns(cache, |store| {
        let removed = store.remove_index(index);
        let changed = removed.is_some();
        Ok((removed, changed))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use std::sync::Arc;

    fn cache_with(value: Value) -> Cache<MemoryStore> {
        match value {
            Value::Object(map) => Cache::new(MemoryStore::with_entries(map)),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_empty_storage_loads_empty_list() {
        let cache = cache_with(json!({}));
        let store = load_patterns(&cache).await.unwrap();
        assert!(store.is_empty());
        // Nothing to migrate, nothing written
        assert!(cache.store().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_loads_current_schema() {
        let cache = cache_with(json!({
            PATTERNS_KEY: [["*", "a.com", "*", "*"], ["https", "b.com", "", "/x"]],
            SCHEMA_KEY: 2,
        }));
        let store = load_patterns(&cache).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.at(1), Some(&Pattern::new("b.com").with_scheme("https").with_port("").with_path("/x")));
    }

    #[tokio::test]
    async fn test_migrates_legacy_list() {
        let cache = cache_with(json!({
            PATTERNS_KEY: [["b.com", "x", "https"], ["a.com", "*", "*"], ["a.com", "*", "*"]],
        }));
        let store = load_patterns(&cache).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.at(0), Some(&Pattern::new("a.com")));
        assert_eq!(store.at(1), Some(&Pattern::new("b.com").with_scheme("https").with_path("/x")));

        let persisted = cache.store().snapshot();
        assert_eq!(persisted.get(SCHEMA_KEY), Some(&json!(2)));
        assert_eq!(
            persisted.get(PATTERNS_KEY),
            Some(&json!([["*", "a.com", "*", "*"], ["https", "b.com", "*", "/x"]]))
        );
    }

    #[tokio::test]
    async fn test_explicit_legacy_marker() {
        let cache = cache_with(json!({
            PATTERNS_KEY: [["a.com", "/p", "http"]],
            SCHEMA_KEY: 1,
        }));
        let store = load_patterns(&cache).await.unwrap();
        assert_eq!(store.at(0), Some(&Pattern::new("a.com").with_scheme("http").with_path("/p")));
    }

    #[tokio::test]
    async fn test_rejects_bad_data() {
        let mixed = cache_with(json!({
            PATTERNS_KEY: [["a.com", "/p", "http"], ["*", "a.com", "*", "*"]],
        }));
        assert!(matches!(load_patterns(&mixed).await, Err(PatternListError::Malformed(_))));

        let wrong_width = cache_with(json!({
            PATTERNS_KEY: [["a.com", "/p", "http"]],
            SCHEMA_KEY: 2,
        }));
        assert!(matches!(load_patterns(&wrong_width).await, Err(PatternListError::Malformed(_))));

        let not_strings = cache_with(json!({ PATTERNS_KEY: [[1, 2, 3, 4]] }));
        assert!(matches!(load_patterns(&not_strings).await, Err(PatternListError::Malformed(_))));

        let future = cache_with(json!({ PATTERNS_KEY: [], SCHEMA_KEY: 3 }));
        assert!(matches!(load_patterns(&future).await, Err(PatternListError::UnsupportedSchema(3))));

        let no_domain = cache_with(json!({ PATTERNS_KEY: [["b.com", "*", "*", "*"], ["*", "", "*", "*"]] }));
        assert!(matches!(load_patterns(&no_domain).await, Err(PatternListError::Pattern(_))));
    }

    #[tokio::test]
    async fn test_unmarked_list_needs_a_known_width() {
        let short = cache_with(json!({ PATTERNS_KEY: [["a.com", "/p"]] }));
        assert!(matches!(load_patterns(&short).await, Err(PatternListError::Malformed(_))));

        let long = cache_with(json!({ PATTERNS_KEY: [["*", "a.com", "*", "*", "extra"]] }));
        assert!(matches!(load_patterns(&long).await, Err(PatternListError::Malformed(_))));

        // Nothing was written back
        assert!(short.store().snapshot().get(SCHEMA_KEY).is_none());
        assert_eq!(long.store().snapshot().get(PATTERNS_KEY), Some(&json!([["*", "a.com", "*", "*", "extra"]])));
    }

    #[tokio::test]
    async fn test_rebuilds_unsorted_list() {
        let cache = cache_with(json!({
            PATTERNS_KEY: [["*", "b.com", "*", "*"], ["*", "a.com", "*", "*"]],
            SCHEMA_KEY: 2,
        }));
        let store = load_patterns(&cache).await.unwrap();
        assert!(store.is_well_formed());
        assert_eq!(store.at(0).map(|p| p.domain_name.as_str()), Some("a.com"));
        assert_eq!(
            cache.store().snapshot().get(PATTERNS_KEY),
            Some(&json!([["*", "a.com", "*", "*"], ["*", "b.com", "*", "*"]]))
        );
    }

    #[tokio::test]
    async fn test_add_and_remove_persist() {
        let cache = cache_with(json!({}));

        let (added, store) = add_pattern(&cache, Pattern::new("a.com")).await.unwrap();
        assert!(added);
        assert_eq!(store.len(), 1);

        let (added, _) = add_pattern(&cache, Pattern::new("a.com")).await.unwrap();
        assert!(!added);

        let (removed, store) = remove_pattern(&cache, -1).await.unwrap();
        assert_eq!(removed, Some(Pattern::new("a.com")));
        assert!(store.is_empty());

        let (removed, _) = remove_pattern(&cache, 5).await.unwrap();
        assert_eq!(removed, None);

        // A fresh cache over the same store sees the persisted result
        let reloaded = Cache::new(MemoryStore::with_entries(cache.store().snapshot()));
        assert!(load_patterns(&reloaded).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_all_kept() {
        let cache = Arc::new(cache_with(json!({})));

        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                add_pattern(&cache, Pattern::new(format!("site{i}.com"))).await.map(|(added, _)| added)
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }

        assert_eq!(load_patterns(&cache).await.unwrap().len(), 8);
    }
}
