//! Cloud Key Bot - Main Entry Point
//!
//! A Telegram bot that stores per-user DigitalOcean and Paperspace API keys
//! and lets each user pick the active one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cloud_key_bot::commands::CommandHandler;
use cloud_key_bot::config::BotSettings;
use cloud_key_bot::storage::{KeyRegistry, open_backend};
use cloud_key_bot::telegram::TelegramBot;

/// Telegram bot for managing cloud provider API keys.
#[derive(Parser, Debug)]
#[command(name = "cloud_key_bot")]
#[command(about = "Manage per-user DigitalOcean and Paperspace API keys over Telegram")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON key file, used when DATABASE_URL is not set.
    #[arg(long)]
    keys_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let mut settings =
        BotSettings::from_env().context("Failed to load bot settings from environment")?;
    settings.storage = settings.storage.with_keys_file(args.keys_file);

    if settings.allowed_user_ids.is_empty() {
        warn!("ALLOWED_USER_IDS is empty; every user will be denied");
    }
    info!("Loaded settings: {:?}", settings);

    let backend = open_backend(&settings.storage)
        .await
        .context("Failed to open key storage")?;
    let registry = KeyRegistry::new(backend);

    // A failed init is logged, not fatal: commands report storage errors per request.
    if let Err(e) = registry.init().await {
        warn!("Key storage initialisation failed: {}", e);
    }

    let settings = Arc::new(settings);
    let commands = Arc::new(CommandHandler::new(registry, Arc::clone(&settings)));
    let bot = TelegramBot::new(Arc::clone(&settings), commands);

    if let Err(e) = bot.register_commands().await {
        warn!("Failed to register bot command menu: {}", e);
    }

    info!("Bot started. Allowed users: {:?}", settings.allowed_user_ids);
    info!("Bot is running. Use Ctrl+C to stop.");
    bot.run().await;

    info!("Shutting down...");
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
