//! JSON file key/value store
//!
//! All keys live in one JSON object on disk. Writes go to a sibling temp file
//! first and are renamed into place so a crash never leaves a half-written
//! file behind.

use super::KeyValueStore;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct FileStore {
    path: PathBuf,
    /// Parsed file contents, loaded on first access
    cache: Mutex<Option<Map<String, Value>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map),
            other => Err(SyncError::Storage(format!(
                "{} is not a JSON object (found {})",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    async fn persist(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Run `mutate` against the loaded map and write the result back.
    ///
    /// A file that cannot be parsed is replaced rather than blocking writes.
    async fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            let loaded = match self.read_file().await {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Overlay file unreadable, starting empty");
                    Map::new()
                }
            };
            *cache = Some(loaded);
        }

        let map = cache.get_or_insert_with(Map::new);
        mutate(map);
        self.persist(map).await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache.as_ref().and_then(|map| map.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        self.update(move |map| {
            map.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            map.remove(key);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overlay.json");

        let store = FileStore::new(&path);
        store.set("user:pending", serde_json::json!(["u1"])).await.unwrap();
        drop(store);

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("user:pending").await.unwrap(),
            Some(serde_json::json!(["u1"]))
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested/none.json"));
        assert!(store.get("anything").await.unwrap().is_none());

        store.set("k", serde_json::json!(true)).await.unwrap();
        assert!(dir.path().join("nested/none.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_errors_on_read_and_is_replaced_on_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overlay.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(store.get("k").await.is_err());

        store.set("k", serde_json::json!("v")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(serde_json::json!("v")));
    }
}
