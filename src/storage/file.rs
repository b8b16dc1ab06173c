//! JSON file backend for local development.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::backend::KeyBackend;
use super::error::StorageError;

/// Stores every user's document in one JSON object keyed by stringified user id.
///
/// Each write rewrites the whole file through a temporary sibling that is
/// renamed into place, so readers never observe a truncated file. Within the
/// process, rewrites hold the write side of `lock` and reads the read side.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileBackend {
    /// Creates a backend over the given file. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::CorruptFile {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_all(&self, all: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(all)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl KeyBackend for JsonFileBackend {
    async fn init(&self) -> Result<(), StorageError> {
        info!("Using local JSON file storage ({})", self.path.display());
        Ok(())
    }

    async fn load(&self, user_id: i64) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.read().await;
        let mut all = self.read_all().await?;
        Ok(all.remove(&user_id.to_string()))
    }

    async fn save(&self, user_id: i64, document: &Value) -> Result<(), StorageError> {
        let _guard = self.lock.write().await;
        let mut all = self.read_all().await?;
        all.insert(user_id.to_string(), document.clone());
        self.write_all(&all).await?;
        debug!(user_id, "Saved record to {}", self.path.display());
        Ok(())
    }

    async fn delete(&self, user_id: i64) -> Result<bool, StorageError> {
        let _guard = self.lock.write().await;
        let mut all = self.read_all().await?;
        if all.remove(&user_id.to_string()).is_none() {
            return Ok(false);
        }
        self.write_all(&all).await?;
        Ok(true)
    }

    async fn user_ids(&self) -> Result<Vec<i64>, StorageError> {
        let _guard = self.lock.read().await;
        let all = self.read_all().await?;
        let mut ids = all
            .keys()
            .map(|key| {
                key.parse::<i64>()
                    .map_err(|_| StorageError::InvalidUserId(key.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort_unstable();
        Ok(ids)
    }

    fn describe(&self) -> String {
        format!("JSON file ({})", self.path.display())
    }
}
