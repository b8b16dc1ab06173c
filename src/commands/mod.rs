//! Command handling module.
//!
//! Parses key-management commands sent to the bot and executes them
//! against the key registry.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{BotCommand, CommandResult};
