//! Standalone inspector for stored API key records.
//!
//! Opens the configured key storage, classifies every user's document by
//! format generation, and prints the keys with their tokens masked.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cloud_key_bot::config::StorageConfig;
use cloud_key_bot::storage::{KeyBackend, Namespace, StoredRecord, mask_token, open_backend};

/// Key storage inspector.
#[derive(Parser, Debug)]
#[command(name = "inspect_keys")]
#[command(about = "Inspects stored API key records for the cloud key bot")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// JSON key file, used when DATABASE_URL is not set.
    #[arg(long)]
    keys_file: Option<PathBuf>,

    /// Only inspect this user.
    #[arg(short, long)]
    user: Option<i64>,

    /// Only show this namespace (`do` or `ps`).
    #[arg(short, long)]
    namespace: Option<Namespace>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        eprintln!("Could not load .env file ({}): {e}", args.env_file);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let storage = StorageConfig::from_env().with_keys_file(args.keys_file);
    runtime.block_on(inspect(&storage, args.user, args.namespace))
}

async fn inspect(storage: &StorageConfig, user: Option<i64>, only: Option<Namespace>) -> ExitCode {
    println!("Inspecting: {storage:?}\n");

    let backend = match open_backend(storage).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("✗ Failed to open key storage: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = backend.init().await {
        eprintln!("✗ Failed to initialise key storage: {e}");
        return ExitCode::FAILURE;
    }

    let user_ids = match user {
        Some(id) => vec![id],
        None => match backend.user_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                eprintln!("✗ Failed to list users: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let mut malformed = 0;
    let mut legacy = 0;

    for user_id in &user_ids {
        match inspect_user(backend.as_ref(), *user_id, only).await {
            Ok(needs_migration) => {
                if needs_migration {
                    legacy += 1;
                }
            }
            Err(e) => {
                malformed += 1;
                println!("[{user_id}]\n  ✗ Error: {e}");
            }
        }
    }

    println!();

    let total = user_ids.len();
    if malformed == 0 {
        println!("✓ All {total} records are readable.");
        if legacy > 0 {
            println!("  ({legacy} record(s) in an older format, migrated on next write)");
        }
        ExitCode::SUCCESS
    } else {
        println!("✗ {malformed} malformed record(s) in {total}");
        println!("  Readable: {}/{total}", total - malformed);
        ExitCode::FAILURE
    }
}

/// Prints one user's record. Returns whether it is in an older format.
async fn inspect_user(
    backend: &dyn KeyBackend,
    user_id: i64,
    only: Option<Namespace>,
) -> Result<bool, String> {
    let Some(document) = backend.load(user_id).await.map_err(|e| e.to_string())? else {
        println!("[{user_id}] no record");
        return Ok(false);
    };

    let stored = StoredRecord::classify(document).map_err(|e| e.to_string())?;
    let generation = stored.generation();
    let needs_migration = stored.needs_migration();
    let record = stored.into_current();

    println!("[{user_id}] format: {generation}");
    for ns in Namespace::ALL.into_iter().filter(|ns| only.is_none_or(|o| o == *ns)) {
        let state = record.namespace(ns);
        let active = state.active.as_deref().unwrap_or("none");
        println!(
            "  {} ({ns}): {} key(s), active: {active}",
            ns.label(),
            state.keys.len()
        );

        for (name, token) in &state.keys {
            let marker = if state.active.as_deref() == Some(name.as_str()) {
                "→"
            } else {
                " "
            };
            println!("    {marker} {name}: {}", mask_token(token));
        }
    }

    Ok(needs_migration)
}
