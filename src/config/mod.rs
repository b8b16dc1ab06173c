//! Configuration module for the bot.
//!
//! Settings are read from the environment once at startup and passed
//! explicitly to the components that need them.

mod settings;

pub use settings::{BOT_TOKEN_VAR, BotSettings, ConfigError, StorageConfig, parse_allowed_user_ids};
