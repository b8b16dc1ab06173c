//! Per-user API key storage.
//!
//! Documents are persisted by one of two backends (a JSON file or a
//! PostgreSQL table), migrated to the current two-namespace shape on every
//! read, and manipulated through [`KeyRegistry`].

mod backend;
mod error;
mod file;
mod migrate;
mod postgres;
mod record;
mod registry;

pub use backend::{KeyBackend, open_backend};
pub use error::StorageError;
pub use file::JsonFileBackend;
pub use migrate::{FlatDocument, MigrationError, StoredRecord, migrate};
pub use postgres::PostgresBackend;
pub use record::{
    DEFAULT_KEY_NAME, Namespace, NamespaceState, UnknownNamespace, UserRecord, mask_token,
};
pub use registry::KeyRegistry;
