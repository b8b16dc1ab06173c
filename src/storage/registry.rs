//! Named-key registry built on a [`KeyBackend`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::backend::KeyBackend;
use super::error::StorageError;
use super::migrate::StoredRecord;
use super::record::{Namespace, UserRecord};

/// Credential operations scoped to a user and namespace.
///
/// Every call loads the user's document, migrates it to the current shape,
/// and (for mutations) writes it back. Nothing is cached between calls.
#[derive(Clone)]
pub struct KeyRegistry {
    backend: Arc<dyn KeyBackend>,
}

impl KeyRegistry {
    /// Creates a registry over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyBackend>) -> Self {
        Self { backend }
    }

    /// Runs backend initialisation.
    pub async fn init(&self) -> Result<(), StorageError> {
        self.backend.init().await
    }

    /// Loads a user's record in the current shape.
    ///
    /// A document that matches no known shape is logged and read as empty.
    pub async fn load_record(&self, user_id: i64) -> Result<UserRecord, StorageError> {
        let Some(raw) = self.backend.load(user_id).await? else {
            return Ok(UserRecord::default());
        };

        match StoredRecord::classify(raw) {
            Ok(stored) => {
                if stored.needs_migration() {
                    info!(
                        user_id,
                        generation = stored.generation(),
                        "Migrating stored record to namespaced format"
                    );
                }
                Ok(stored.into_current())
            }
            Err(e) => {
                warn!(user_id, "Ignoring malformed stored record: {}", e);
                Ok(UserRecord::default())
            }
        }
    }

    async fn save_record(&self, user_id: i64, record: &UserRecord) -> Result<(), StorageError> {
        let document = record.to_document()?;
        self.backend.save(user_id, &document).await
    }

    /// Saves or overwrites a named key. The first key in a namespace becomes active.
    pub async fn add_or_replace(
        &self,
        user_id: i64,
        ns: Namespace,
        name: &str,
        token: &str,
    ) -> Result<(), StorageError> {
        let mut record = self.load_record(user_id).await?;
        record.namespace_mut(ns).insert(name, token);
        self.save_record(user_id, &record).await?;
        info!(user_id, namespace = %ns, "Saved key '{}'", name);
        Ok(())
    }

    /// Deletes a named key. Returns false if it did not exist.
    pub async fn delete(&self, user_id: i64, ns: Namespace, name: &str) -> Result<bool, StorageError> {
        let mut record = self.load_record(user_id).await?;
        if !record.namespace_mut(ns).remove(name) {
            return Ok(false);
        }
        self.save_record(user_id, &record).await?;
        info!(user_id, namespace = %ns, "Deleted key '{}'", name);
        Ok(true)
    }

    /// Switches the active key. Returns false if `name` is not stored.
    pub async fn set_active(
        &self,
        user_id: i64,
        ns: Namespace,
        name: &str,
    ) -> Result<bool, StorageError> {
        let mut record = self.load_record(user_id).await?;
        if !record.namespace_mut(ns).activate(name) {
            return Ok(false);
        }
        self.save_record(user_id, &record).await?;
        info!(user_id, namespace = %ns, "Switched active key to '{}'", name);
        Ok(true)
    }

    /// Returns all keys in a namespace.
    pub async fn list_all(
        &self,
        user_id: i64,
        ns: Namespace,
    ) -> Result<BTreeMap<String, String>, StorageError> {
        let mut record = self.load_record(user_id).await?;
        Ok(std::mem::take(&mut record.namespace_mut(ns).keys))
    }

    /// Returns the name of the active key, if the namespace has one.
    pub async fn get_active_name(
        &self,
        user_id: i64,
        ns: Namespace,
    ) -> Result<Option<String>, StorageError> {
        let mut record = self.load_record(user_id).await?;
        Ok(record.namespace_mut(ns).active.take())
    }

    /// Returns the token of the active key.
    pub async fn get_active_token(
        &self,
        user_id: i64,
        ns: Namespace,
    ) -> Result<Option<String>, StorageError> {
        let record = self.load_record(user_id).await?;
        Ok(record.namespace(ns).active_token().map(str::to_owned))
    }

    /// Returns true if at least one key is stored in the namespace.
    pub async fn has_any(&self, user_id: i64, ns: Namespace) -> Result<bool, StorageError> {
        let record = self.load_record(user_id).await?;
        Ok(!record.namespace(ns).is_empty())
    }

    /// Returns the active token, else `fallback`, else `None`.
    ///
    /// The fallback is supplied by the caller (typically a process-wide
    /// default key); empty fallbacks count as absent.
    pub async fn resolve_effective_token(
        &self,
        user_id: i64,
        ns: Namespace,
        fallback: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        if let Some(token) = self.get_active_token(user_id, ns).await? {
            return Ok(Some(token));
        }
        Ok(fallback.filter(|t| !t.is_empty()).map(str::to_owned))
    }

    /// Deletes everything stored for a user, in both namespaces.
    pub async fn delete_all(&self, user_id: i64) -> Result<bool, StorageError> {
        let existed = self.backend.delete(user_id).await?;
        if existed {
            info!(user_id, "Deleted all stored keys");
        }
        Ok(existed)
    }
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("backend", &self.backend.describe())
            .finish()
    }
}
