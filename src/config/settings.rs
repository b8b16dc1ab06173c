//! Application settings loaded from the environment.

use std::path::PathBuf;

use crate::storage::{Namespace, mask_token};

/// Environment variable holding the Telegram bot token.
pub const BOT_TOKEN_VAR: &str = "TG_BOT_TOKEN";

fn default_keys_file() -> PathBuf {
    PathBuf::from("user_keys.json")
}

/// Where per-user keys are persisted. Resolved once at startup.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Single JSON file (local development).
    JsonFile { path: PathBuf },
    /// PostgreSQL database.
    Postgres { url: String },
}

impl StorageConfig {
    /// Selects PostgreSQL when `DATABASE_URL` is set, the JSON file otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Self::Postgres {
                url: normalize_database_url(url.trim()),
            },
            None => Self::JsonFile {
                path: lookup("KEYS_FILE").map_or_else(default_keys_file, PathBuf::from),
            },
        }
    }

    /// Replaces the JSON file path. Has no effect on a database configuration.
    #[must_use]
    pub fn with_keys_file(self, path: Option<PathBuf>) -> Self {
        match (self, path) {
            (Self::JsonFile { .. }, Some(path)) => Self::JsonFile { path },
            (config, _) => config,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::JsonFile {
            path: default_keys_file(),
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JsonFile { path } => f.debug_struct("JsonFile").field("path", path).finish(),
            Self::Postgres { .. } => f.debug_struct("Postgres").finish_non_exhaustive(),
        }
    }
}

/// Hosting providers hand out `postgres://` URLs; normalise to `postgresql://`.
fn normalize_database_url(url: &str) -> String {
    url.strip_prefix("postgres://")
        .map_or_else(|| url.to_owned(), |rest| format!("postgresql://{rest}"))
}

/// Bot settings.
#[derive(Clone)]
pub struct BotSettings {
    /// Telegram Bot API token.
    pub bot_token: String,

    /// Users allowed to talk to the bot. Empty means nobody.
    pub allowed_user_ids: Vec<i64>,

    /// Server-wide DigitalOcean key used when a user has none.
    pub do_fallback_token: Option<String>,

    /// Server-wide Paperspace key used when a user has none.
    pub ps_fallback_token: Option<String>,

    /// Key storage backend.
    pub storage: StorageConfig,
}

impl BotSettings {
    /// Creates settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `TG_BOT_TOKEN` is missing or `ALLOWED_USER_IDS` is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = lookup(BOT_TOKEN_VAR)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar(BOT_TOKEN_VAR))?;

        let allowed_user_ids = match lookup("ALLOWED_USER_IDS") {
            Some(raw) => parse_allowed_user_ids(&raw)?,
            None => Vec::new(),
        };

        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bot_token,
            allowed_user_ids,
            do_fallback_token: optional("DO_API_TOKEN"),
            ps_fallback_token: optional("PS_API_TOKEN"),
            storage: StorageConfig::from_lookup(&lookup),
        })
    }

    /// Returns true if the user may use the bot.
    #[must_use]
    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.contains(&user_id)
    }

    /// Returns the server-wide key for a namespace.
    #[must_use]
    pub fn fallback_token(&self, ns: Namespace) -> Option<&str> {
        match ns {
            Namespace::DigitalOcean => self.do_fallback_token.as_deref(),
            Namespace::Paperspace => self.ps_fallback_token.as_deref(),
        }
    }
}

impl std::fmt::Debug for BotSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotSettings")
            .field("bot_token", &mask_token(&self.bot_token))
            .field("allowed_user_ids", &self.allowed_user_ids)
            .field("do_fallback_token", &self.do_fallback_token.as_deref().map(mask_token))
            .field("ps_fallback_token", &self.ps_fallback_token.as_deref().map(mask_token))
            .field("storage", &self.storage)
            .finish()
    }
}

/// Parses the allowed user list.
///
/// Accepts a JSON array (`[123, 456]`), a comma-separated list (`123,456`)
/// or a single id (`123`).
///
/// # Errors
///
/// Returns an error if any entry is not an integer.
pub fn parse_allowed_user_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    let raw = raw.trim();

    if raw.starts_with('[')
        && let Ok(ids) = serde_json::from_str::<Vec<i64>>(raw)
    {
        return Ok(ids);
    }

    raw.trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_matches('"')
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidUserId(s.to_owned()))
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid user id in ALLOWED_USER_IDS: '{0}' (must be an integer)")]
    InvalidUserId(String),
}
