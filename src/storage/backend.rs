//! Backend abstraction over the physical key stores.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::error::StorageError;
use super::file::JsonFileBackend;
use super::postgres::PostgresBackend;
use crate::config::StorageConfig;

/// Persists one JSON document per user.
///
/// Implementations know nothing about the document's shape; migration and
/// key semantics live in [`KeyRegistry`](super::KeyRegistry).
#[async_trait]
pub trait KeyBackend: Send + Sync {
    /// Prepares the backend. Safe to call on every start.
    async fn init(&self) -> Result<(), StorageError>;

    /// Loads the raw document for a user, if one is stored.
    async fn load(&self, user_id: i64) -> Result<Option<Value>, StorageError>;

    /// Stores the document for a user, replacing any previous one.
    async fn save(&self, user_id: i64, document: &Value) -> Result<(), StorageError>;

    /// Removes a user's document. Returns whether one existed.
    async fn delete(&self, user_id: i64) -> Result<bool, StorageError>;

    /// Lists every user with a stored document, in ascending order.
    async fn user_ids(&self) -> Result<Vec<i64>, StorageError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Opens the backend selected by the configuration.
///
/// # Errors
///
/// Returns an error if the database pool cannot be created.
pub async fn open_backend(config: &StorageConfig) -> Result<Arc<dyn KeyBackend>, StorageError> {
    let backend: Arc<dyn KeyBackend> = match config {
        StorageConfig::JsonFile { path } => Arc::new(JsonFileBackend::new(path.clone())),
        StorageConfig::Postgres { url } => Arc::new(PostgresBackend::connect(url).await?),
    };
    info!("Using {} key storage", backend.describe());
    Ok(backend)
}
