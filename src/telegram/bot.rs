//! Telegram transport for the command handler.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{BotCommand as MenuCommand, UserId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::commands::{BotCommand, CommandHandler};
use crate::config::BotSettings;

/// Reply sent to users outside the allow-list.
pub const ACCESS_DENIED: &str = "⛔ Access denied.";

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),
}

/// Outcome of checking a message sender against the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted(i64),
    Denied(Option<i64>),
}

/// Checks whether a sender may use the bot.
#[must_use]
pub fn check_access(settings: &BotSettings, sender: Option<UserId>) -> Access {
    let user_id = sender.and_then(|id| i64::try_from(id.0).ok());
    match user_id {
        Some(id) if settings.is_allowed(id) => Access::Granted(id),
        other => Access::Denied(other),
    }
}

/// Long-polling Telegram bot.
pub struct TelegramBot {
    bot: Bot,
    commands: Arc<CommandHandler>,
    settings: Arc<BotSettings>,
}

impl TelegramBot {
    /// Creates a bot from settings.
    #[must_use]
    pub fn new(settings: Arc<BotSettings>, commands: Arc<CommandHandler>) -> Self {
        let bot = Bot::new(&settings.bot_token);
        Self {
            bot,
            commands,
            settings,
        }
    }

    /// Publishes the command list shown in Telegram's "/" menu.
    ///
    /// # Errors
    ///
    /// Returns an error if the Telegram request fails.
    pub async fn register_commands(&self) -> Result<(), TelegramError> {
        let menu: Vec<MenuCommand> = BotCommand::all_commands()
            .into_iter()
            .map(|(cmd, _, desc)| MenuCommand::new(cmd, desc))
            .collect();
        let count = menu.len();
        self.bot.set_my_commands(menu).await?;
        info!("Registered {} bot commands with Telegram", count);
        Ok(())
    }

    /// Receives updates until Ctrl+C.
    pub async fn run(self) {
        let handler = Update::filter_message().endpoint(on_message);

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.commands, self.settings])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

async fn on_message(
    bot: Bot,
    msg: Message,
    commands: Arc<CommandHandler>,
    settings: Arc<BotSettings>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(command) = BotCommand::parse(text) else {
        return Ok(());
    };

    let sender = msg.from.as_ref();
    let user_id = match check_access(&settings, sender.map(|u| u.id)) {
        Access::Granted(id) => id,
        Access::Denied(id) => {
            warn!(
                user_id = ?id,
                username = sender.and_then(|u| u.username.as_deref()).unwrap_or("N/A"),
                "Unauthorized access attempt"
            );
            bot.send_message(msg.chat.id, ACCESS_DENIED).await?;
            return Ok(());
        }
    };

    if command.is_sensitive() {
        // The message holds a raw token; do not leave it in the chat history.
        if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
            warn!(user_id, "Could not delete message containing a token: {}", e);
        }
    }

    debug!(user_id, "Executing {}", command);
    let result = commands.execute(user_id, command).await;
    bot.send_message(msg.chat.id, result.message).await?;
    Ok(())
}
