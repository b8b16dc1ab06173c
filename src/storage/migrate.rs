//! Schema migration for stored credential documents.
//!
//! Three generations of documents exist in the wild:
//! 1. A bare token per user (a JSON string, or `{"token": "..."}`).
//! 2. A single implicit DigitalOcean namespace: `{"keys": {...}, "active": "..."}`.
//! 3. The current shape: `{"do": {...}, "ps": {...}}`.
//!
//! A raw document is first classified into [`StoredRecord`] and then converted
//! into a [`UserRecord`]. Conversion is pure; migrating a current document
//! yields the same document.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::record::{DEFAULT_KEY_NAME, NamespaceState, UserRecord};

/// Reasons a stored document cannot be migrated.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Document has an unrecognized shape (top-level keys: {keys})")]
    UnknownShape { keys: String },

    #[error("Document is a JSON {kind}, expected an object or a token string")]
    UnexpectedType { kind: &'static str },

    #[error("Document looks like {generation} but is malformed: {source}")]
    Malformed {
        generation: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Second-generation shape: one namespace of named keys without a wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct FlatDocument {
    #[serde(default)]
    pub keys: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub active: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenDocument {
    token: Option<String>,
}

/// A raw document, tagged by the storage generation that wrote it.
#[derive(Debug, Clone)]
pub enum StoredRecord {
    /// Nothing stored, `null`, or `{}`.
    Empty,
    /// First generation: a single unnamed token.
    BareToken(String),
    /// Second generation: DigitalOcean keys without the namespace wrapper.
    Flat(FlatDocument),
    /// Current generation.
    Namespaced(UserRecord),
}

impl StoredRecord {
    /// Classifies a raw document by shape.
    ///
    /// # Errors
    ///
    /// Returns an error for documents that match no known generation or that
    /// match one but carry fields of the wrong type.
    pub fn classify(value: Value) -> Result<Self, MigrationError> {
        match value {
            Value::Null => Ok(Self::Empty),
            Value::String(token) => Ok(Self::from_token(Some(token))),
            Value::Object(map) => Self::classify_object(map),
            Value::Bool(_) => Err(MigrationError::UnexpectedType { kind: "boolean" }),
            Value::Number(_) => Err(MigrationError::UnexpectedType { kind: "number" }),
            Value::Array(_) => Err(MigrationError::UnexpectedType { kind: "array" }),
        }
    }

    fn classify_object(map: Map<String, Value>) -> Result<Self, MigrationError> {
        if map.is_empty() {
            return Ok(Self::Empty);
        }

        if map.contains_key("do") || map.contains_key("ps") {
            let record = serde_json::from_value(Value::Object(map)).map_err(|source| {
                MigrationError::Malformed {
                    generation: "a namespaced record",
                    source,
                }
            })?;
            return Ok(Self::Namespaced(record));
        }

        if map.contains_key("keys") || map.contains_key("active") {
            let flat = serde_json::from_value(Value::Object(map)).map_err(|source| {
                MigrationError::Malformed {
                    generation: "a flat key list",
                    source,
                }
            })?;
            return Ok(Self::Flat(flat));
        }

        if map.contains_key("token") {
            let doc: TokenDocument =
                serde_json::from_value(Value::Object(map)).map_err(|source| {
                    MigrationError::Malformed {
                        generation: "a single-token record",
                        source,
                    }
                })?;
            return Ok(Self::from_token(doc.token));
        }

        let keys = map.keys().cloned().collect::<Vec<_>>().join(", ");
        Err(MigrationError::UnknownShape { keys })
    }

    fn from_token(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.trim().is_empty() => Self::BareToken(token),
            _ => Self::Empty,
        }
    }

    /// Returns a short name for the generation, used in logs.
    #[must_use]
    pub const fn generation(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::BareToken(_) => "bare-token",
            Self::Flat(_) => "flat",
            Self::Namespaced(_) => "namespaced",
        }
    }

    /// Returns true if converting this record changes its stored shape.
    #[must_use]
    pub const fn needs_migration(&self) -> bool {
        matches!(self, Self::BareToken(_) | Self::Flat(_))
    }

    /// Converts into the current record shape, restoring the active-key invariant.
    #[must_use]
    pub fn into_current(self) -> UserRecord {
        let mut record = match self {
            Self::Empty => UserRecord::default(),
            Self::BareToken(token) => UserRecord {
                digitalocean: NamespaceState::with_single_key(DEFAULT_KEY_NAME, token),
                paperspace: NamespaceState::default(),
            },
            Self::Flat(flat) => UserRecord {
                digitalocean: NamespaceState {
                    keys: flat.keys,
                    active: flat.active,
                },
                paperspace: NamespaceState::default(),
            },
            Self::Namespaced(record) => record,
        };
        record.normalize();
        record
    }
}

/// Classifies and converts a raw document in one step.
///
/// # Errors
///
/// See [`StoredRecord::classify`].
pub fn migrate(value: Value) -> Result<UserRecord, MigrationError> {
    StoredRecord::classify(value).map(StoredRecord::into_current)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_bare_string_token() {
        let record = migrate(json!("dop_v1_legacy")).unwrap();
        assert_eq!(record.digitalocean.keys.len(), 1);
        assert_eq!(
            record.digitalocean.keys.get(DEFAULT_KEY_NAME).map(String::as_str),
            Some("dop_v1_legacy")
        );
        assert_eq!(record.digitalocean.active.as_deref(), Some(DEFAULT_KEY_NAME));
        assert!(record.paperspace.is_empty());
        assert!(record.paperspace.active.is_none());
    }

    #[test]
    fn test_token_object() {
        let record = migrate(json!({"token": "dop_v1_legacy"})).unwrap();
        assert_eq!(record.digitalocean.active_token(), Some("dop_v1_legacy"));
        assert!(record.paperspace.is_empty());
    }

    #[test]
    fn test_null_token_is_empty() {
        let record = migrate(json!({"token": null})).unwrap();
        assert!(record.is_empty());
        let record = migrate(json!("  ")).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_flat_shape_wrapped_into_do() {
        let raw = json!({
            "keys": {"Personal": "dop_v1_x", "Work": "dop_v1_y"},
            "active": "Work"
        });
        let stored = StoredRecord::classify(raw).unwrap();
        assert_eq!(stored.generation(), "flat");
        assert!(stored.needs_migration());

        let record = stored.into_current();
        assert_eq!(record.digitalocean.keys.len(), 2);
        assert_eq!(record.digitalocean.active.as_deref(), Some("Work"));
        assert!(record.paperspace.is_empty());
    }

    #[test]
    fn test_flat_shape_with_missing_active() {
        let record = migrate(json!({"keys": {"Zed": "z", "Alpha": "a"}})).unwrap();
        assert_eq!(record.digitalocean.active.as_deref(), Some("Alpha"));
    }

    #[test]
    fn test_current_shape_is_idempotent() {
        let raw = json!({
            "do": {"keys": {"Home": "tok_xyz", "Work": "tok_abc"}, "active": "Home"},
            "ps": {"keys": {"Team": "ps_123"}, "active": "Team"}
        });
        let bytes_before = serde_json::to_vec(&raw).unwrap();

        let stored = StoredRecord::classify(raw).unwrap();
        assert!(!stored.needs_migration());
        let record = stored.into_current();
        let bytes_after = serde_json::to_vec(&record.to_document().unwrap()).unwrap();

        assert_eq!(bytes_before, bytes_after);
        assert_eq!(migrate(record.to_document().unwrap()).unwrap(), record);
    }

    #[test]
    fn test_explicit_null_active_is_dropped_on_save() {
        let raw = json!({
            "do": {"keys": {"Work": "tok_abc"}, "active": "Work"},
            "ps": {"keys": {}, "active": null}
        });
        let record = migrate(raw).unwrap();
        assert_eq!(record.paperspace.active, None);
        assert_eq!(
            record.to_document().unwrap(),
            json!({
                "do": {"keys": {"Work": "tok_abc"}, "active": "Work"},
                "ps": {"keys": {}}
            })
        );
    }

    #[test]
    fn test_current_shape_missing_namespace_filled() {
        // Older writers stored `"ps": {}` or omitted it entirely.
        let record = migrate(json!({"do": {"keys": {"A": "1"}, "active": "A"}})).unwrap();
        assert_eq!(record.digitalocean.active.as_deref(), Some("A"));
        assert!(record.paperspace.is_empty());

        let record = migrate(json!({"do": {}, "ps": {}})).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(migrate(Value::Null).unwrap().is_empty());
        assert!(migrate(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(matches!(
            StoredRecord::classify(json!([1, 2])),
            Err(MigrationError::UnexpectedType { kind: "array" })
        ));
        assert!(matches!(
            StoredRecord::classify(json!({"do": {"keys": ["not", "a", "map"]}})),
            Err(MigrationError::Malformed { .. })
        ));
        assert!(matches!(
            StoredRecord::classify(json!({"something": "else"})),
            Err(MigrationError::UnknownShape { .. })
        ));
    }
}
