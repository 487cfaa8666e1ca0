//! Extension settings
//!
//! Four checkbox flags plus the ids of the windows open in the last browser
//! session, each stored under its own key. Keys missing from the store read
//! as their defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::backend::{PersistentStore, StoreError};
use crate::cache::{Cache, Update};

pub const OPEN_WINDOWS_KEY: &str = "open-windows-ids";

/// Every settings key, in storage spelling.
pub const KEYS: [&str; 5] = [
    "enabled",
    "maximize-on-browser-startup",
    "maximize-window-on-creation",
    "re-minimize-windows",
    OPEN_WINDOWS_KEY,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    pub enabled: bool,
    pub maximize_on_browser_startup: bool,
    pub maximize_window_on_creation: bool,
    pub re_minimize_windows: bool,
    #[serde(deserialize_with = "null_as_empty")]
    pub open_windows_ids: Vec<i64>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i64>, D::Error> {
    Ok(Option::<Vec<i64>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            maximize_on_browser_startup: true,
            maximize_window_on_creation: true,
            re_minimize_windows: false,
            open_windows_ids: Vec::new(),
        }
    }
}

impl Settings {
    /// Read all settings, falling back to defaults for missing keys.
    pub async fn load<S: PersistentStore>(cache: &Cache<S>) -> Result<Self, StoreError> {
        let entries = cache.get(KEYS).await?;
        Ok(serde_json::from_value(Value::Object(entries))?)
    }

    /// Write every setting. Used to install defaults.
    pub async fn store<S: PersistentStore>(&self, cache: &Cache<S>) -> Result<(), StoreError> {
        match serde_json::to_value(self)? {
            Value::Object(entries) => cache.set(entries).await,
            _ => Err(StoreError::Backend("settings did not serialize to an object".into())),
        }
    }

    pub fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::Enabled => self.enabled,
            Flag::MaximizeOnBrowserStartup => self.maximize_on_browser_startup,
            Flag::MaximizeWindowOnCreation => self.maximize_window_on_creation,
            Flag::ReMinimizeWindows => self.re_minimize_windows,
        }
    }
}

// =============================================================================
// Flags
// =============================================================================

/// A boolean setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Enabled,
    MaximizeOnBrowserStartup,
    MaximizeWindowOnCreation,
    ReMinimizeWindows,
}

impl Flag {
    pub const ALL: [Flag; 4] = [
        Flag::Enabled,
        Flag::MaximizeOnBrowserStartup,
        Flag::MaximizeWindowOnCreation,
        Flag::ReMinimizeWindows,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Flag::Enabled => "enabled",
            Flag::MaximizeOnBrowserStartup => "maximize-on-browser-startup",
            Flag::MaximizeWindowOnCreation => "maximize-window-on-creation",
            Flag::ReMinimizeWindows => "re-minimize-windows",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown setting '{0}'")]
pub struct UnknownFlag(pub String);

impl FromStr for Flag {
    type Err = UnknownFlag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Flag::ALL
            .into_iter()
            .find(|flag| flag.key() == s)
            .ok_or_else(|| UnknownFlag(s.to_string()))
    }
}

/// Write a single flag through the cache.
pub async fn set_flag<S: PersistentStore>(cache: &Cache<S>, flag: Flag, value: bool) -> Result<(), StoreError> {
    log::debug!("setting {} to {}", flag, value);
    cache.set_value(flag.key(), json!(value)).await
}

// =============================================================================
// Open Windows
// =============================================================================

fn window_ids(current: Option<Value>) -> Result<Vec<i64>, StoreError> {
    Ok(current
        .filter(|value| !value.is_null())
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_default())
}

/// Record `id` as open. Returns `false` if it was already recorded.
pub async fn track_window<S: PersistentStore>(cache: &Cache<S>, id: i64) -> Result<bool, StoreError> {
    cache
        .update(OPEN_WINDOWS_KEY, |current| {
            let mut ids = window_ids(current)?;
            if ids.contains(&id) {
                return Ok(Update::Keep(false));
            }
            ids.push(id);
            Ok(Update::Write(json!(ids), true))
        })
        .await
}

/// Forget `id`. Returns `false` if it was not recorded.
pub async fn untrack_window<S: PersistentStore>(cache: &Cache<S>, id: i64) -> Result<bool, StoreError> {
    cache
        .update(OPEN_WINDOWS_KEY, |current| {
            let mut ids = window_ids(current)?;
            let before = ids.len();
            ids.retain(|&open| open != id);
            if ids.len() == before {
                return Ok(Update::Keep(false));
            }
            Ok(Update::Write(json!(ids), true))
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_keys_read_as_defaults() {
        let cache = Cache::new(MemoryStore::new());
        assert_eq!(Settings::load(&cache).await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_null_window_ids_read_as_empty() {
        let entries = json!({OPEN_WINDOWS_KEY: null, "enabled": false});
        let cache = Cache::new(MemoryStore::with_entries(entries.as_object().cloned().unwrap()));

        let settings = Settings::load(&cache).await.unwrap();
        assert!(settings.open_windows_ids.is_empty());
        assert!(!settings.enabled);
        assert!(track_window(&cache, 4).await.unwrap());
        assert_eq!(Settings::load(&cache).await.unwrap().open_windows_ids, vec![4]);
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let cache = Cache::new(MemoryStore::new());
        let settings = Settings {
            re_minimize_windows: true,
            open_windows_ids: vec![3, 7],
            ..Settings::default()
        };
        settings.store(&cache).await.unwrap();

        let snapshot = cache.store().snapshot();
        assert_eq!(snapshot.get("re-minimize-windows"), Some(&json!(true)));
        assert_eq!(snapshot.get(OPEN_WINDOWS_KEY), Some(&json!([3, 7])));

        let reloaded = Cache::new(MemoryStore::with_entries(snapshot));
        assert_eq!(Settings::load(&reloaded).await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_set_flag() {
        let cache = Cache::new(MemoryStore::new());
        set_flag(&cache, "enabled".parse().unwrap(), false).await.unwrap();
        let settings = Settings::load(&cache).await.unwrap();
        assert!(!settings.flag(Flag::Enabled));
        assert!(settings.flag(Flag::MaximizeOnBrowserStartup));
    }

    #[test]
    fn test_flag_names() {
        for flag in Flag::ALL {
            assert_eq!(flag.key().parse::<Flag>().unwrap(), flag);
            assert!(KEYS.contains(&flag.key()));
        }
        assert!("open-windows-ids".parse::<Flag>().is_err());
    }

    #[tokio::test]
    async fn test_track_and_untrack_windows() {
        let cache = Cache::new(MemoryStore::new());
        assert!(track_window(&cache, 1).await.unwrap());
        assert!(!track_window(&cache, 1).await.unwrap());
        assert!(track_window(&cache, 2).await.unwrap());

        assert!(untrack_window(&cache, 1).await.unwrap());
        assert!(!untrack_window(&cache, 9).await.unwrap());
        assert_eq!(Settings::load(&cache).await.unwrap().open_windows_ids, vec![2]);
    }

    #[tokio::test]
    async fn test_concurrent_window_tracking() {
        let cache = Arc::new(Cache::new(MemoryStore::new()));
        let mut handles = Vec::new();
        for id in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { track_window(&cache, id).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }

        let mut ids = Settings::load(&cache).await.unwrap().open_windows_ids;
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }
}
