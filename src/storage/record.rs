//! Current-generation credential record types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name given to a token migrated from a record that stored a single unnamed key.
pub const DEFAULT_KEY_NAME: &str = "Default";

/// Cloud provider a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// DigitalOcean keys, stored under `"do"`.
    DigitalOcean,
    /// Paperspace keys, stored under `"ps"`.
    Paperspace,
}

impl Namespace {
    /// Both namespaces, in storage order.
    pub const ALL: [Self; 2] = [Self::DigitalOcean, Self::Paperspace];

    /// Returns the identifier used in persisted documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DigitalOcean => "do",
            Self::Paperspace => "ps",
        }
    }

    /// Returns the provider name shown to users.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::DigitalOcean => "DigitalOcean",
            Self::Paperspace => "Paperspace",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "do" => Ok(Self::DigitalOcean),
            "ps" => Ok(Self::Paperspace),
            other => Err(UnknownNamespace(other.to_owned())),
        }
    }
}

/// Returned when parsing a namespace identifier other than `do` or `ps`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown namespace: '{0}' (expected 'do' or 'ps')")]
pub struct UnknownNamespace(pub String);

/// Named keys for one provider plus the active selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceState {
    /// Display name to token.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,

    /// Name of the active key. `None` exactly when `keys` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
}

impl NamespaceState {
    /// Creates a namespace holding a single active key.
    #[must_use]
    pub fn with_single_key(name: impl Into<String>, token: impl Into<String>) -> Self {
        let name = name.into();
        let mut keys = BTreeMap::new();
        keys.insert(name.clone(), token.into());
        Self {
            keys,
            active: Some(name),
        }
    }

    /// Inserts or overwrites a key. The first key in an empty namespace becomes active.
    pub fn insert(&mut self, name: &str, token: &str) {
        let was_empty = self.keys.is_empty();
        self.keys.insert(name.to_owned(), token.to_owned());
        if was_empty {
            self.active = Some(name.to_owned());
        }
        self.normalize();
    }

    /// Removes a key, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        if self.keys.remove(name).is_none() {
            return false;
        }
        if self.active.as_deref() == Some(name) {
            self.active = self.keys.keys().next().cloned();
        }
        true
    }

    /// Switches the active key. Returns false if `name` is not stored.
    pub fn activate(&mut self, name: &str) -> bool {
        if !self.keys.contains_key(name) {
            return false;
        }
        self.active = Some(name.to_owned());
        true
    }

    /// Returns the token of the active key.
    #[must_use]
    pub fn active_token(&self) -> Option<&str> {
        self.active
            .as_deref()
            .and_then(|name| self.keys.get(name))
            .map(String::as_str)
    }

    /// Restores the `active` invariant: set when keys exist and always pointing at a stored key.
    pub fn normalize(&mut self) {
        let valid = self
            .active
            .as_ref()
            .is_some_and(|name| self.keys.contains_key(name));
        if !valid {
            self.active = self.keys.keys().next().cloned();
        }
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Everything stored for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// DigitalOcean keys.
    #[serde(rename = "do", default)]
    pub digitalocean: NamespaceState,

    /// Paperspace keys.
    #[serde(rename = "ps", default)]
    pub paperspace: NamespaceState,
}

impl UserRecord {
    /// Returns the state of one namespace.
    #[must_use]
    pub const fn namespace(&self, ns: Namespace) -> &NamespaceState {
        match ns {
            Namespace::DigitalOcean => &self.digitalocean,
            Namespace::Paperspace => &self.paperspace,
        }
    }

    /// Returns the state of one namespace for mutation.
    pub fn namespace_mut(&mut self, ns: Namespace) -> &mut NamespaceState {
        match ns {
            Namespace::DigitalOcean => &mut self.digitalocean,
            Namespace::Paperspace => &mut self.paperspace,
        }
    }

    /// Restores the active-key invariant in both namespaces.
    pub fn normalize(&mut self) {
        self.digitalocean.normalize();
        self.paperspace.normalize();
    }

    /// Returns true if neither namespace holds a key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digitalocean.is_empty() && self.paperspace.is_empty()
    }

    /// Serializes the record into the persisted document shape.
    pub fn to_document(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Masks a token for display, keeping the first 6 and last 4 characters.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    } else {
        "***".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_round_trip() {
        for ns in Namespace::ALL {
            assert_eq!(ns.as_str().parse::<Namespace>(), Ok(ns));
        }
        assert!("gcp".parse::<Namespace>().is_err());
    }

    #[test]
    fn test_first_insert_becomes_active() {
        let mut state = NamespaceState::default();
        state.insert("Work", "tok_abc");
        state.insert("Home", "tok_xyz");
        assert_eq!(state.active.as_deref(), Some("Work"));
        assert_eq!(state.active_token(), Some("tok_abc"));
    }

    #[test]
    fn test_overwrite_keeps_active() {
        let mut state = NamespaceState::default();
        state.insert("Work", "tok_abc");
        state.insert("Home", "tok_xyz");
        state.insert("Home", "tok_new");
        assert_eq!(state.active.as_deref(), Some("Work"));
        assert_eq!(state.keys.get("Home").map(String::as_str), Some("tok_new"));
    }

    #[test]
    fn test_remove_active_reassigns() {
        let mut state = NamespaceState::default();
        state.insert("Work", "tok_abc");
        state.insert("Home", "tok_xyz");
        assert!(state.remove("Work"));
        assert_eq!(state.active.as_deref(), Some("Home"));
        assert!(state.remove("Home"));
        assert!(state.active.is_none());
        assert!(!state.remove("Home"));
    }

    #[test]
    fn test_activate_unknown_is_noop() {
        let mut state = NamespaceState::with_single_key("Work", "tok_abc");
        let before = state.clone();
        assert!(!state.activate("Nope"));
        assert_eq!(state, before);
    }

    #[test]
    fn test_normalize_repairs_stale_pointer() {
        let mut state = NamespaceState {
            keys: [("b".to_owned(), "2".to_owned()), ("a".to_owned(), "1".to_owned())]
                .into_iter()
                .collect(),
            active: Some("gone".to_owned()),
        };
        state.normalize();
        assert_eq!(state.active.as_deref(), Some("a"));

        let mut empty = NamespaceState {
            keys: BTreeMap::new(),
            active: Some("gone".to_owned()),
        };
        empty.normalize();
        assert!(empty.active.is_none());
    }

    #[test]
    fn test_document_shape() {
        let record = UserRecord {
            digitalocean: NamespaceState::with_single_key("Work", "tok_abc"),
            paperspace: NamespaceState::default(),
        };
        let doc = record.to_document().unwrap();
        assert_eq!(
            doc,
            serde_json::json!({
                "do": {"keys": {"Work": "tok_abc"}, "active": "Work"},
                "ps": {"keys": {}}
            })
        );
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("dop_v1_abcdef123456"), "dop_v1…3456");
        assert_eq!(mask_token("short"), "***");
        assert_eq!(mask_token("0123456789"), "***");
    }
}
