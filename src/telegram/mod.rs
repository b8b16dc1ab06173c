//! Telegram bot module.
//!
//! Receives messages over the Bot API, applies the allow-list, and forwards
//! key-management commands to the command handler.

mod bot;

pub use bot::{ACCESS_DENIED, Access, TelegramBot, TelegramError, check_access};
