//! JSON file store
//!
//! Keeps the whole key/value document in one JSON object on disk. Writes go
//! to a sibling temp file which then replaces the old document, so readers never
//! see a half-written document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::backend::{select, Entries, PersistentStore, StoreError};

pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the document
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Entries, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Entries::new());
        }

        match serde_json::from_str(&text)? {
            Value::Object(entries) => Ok(entries),
            other => Err(StoreError::Backend(format!(
                "'{}' does not hold a JSON object (found {})",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    async fn write_document(&self, entries: &Entries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let text = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        log::debug!("wrote {} entries to '{}'", entries.len(), self.path.display());
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_document(&Entries::new()).await
    }

    async fn get(&self, keys: Option<&[String]>) -> Result<Entries, StoreError> {
        let document = self.read_document().await?;
        Ok(select(&document, keys))
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        for key in keys {
            document.remove(key);
        }
        self.write_document(&document).await
    }

    async fn set(&self, entries: &Entries) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        for (key, value) in entries {
            document.insert(key.clone(), value.clone());
        }
        self.write_document(&document).await
    }
}
