//! Command handler implementation.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::types::{BotCommand, CommandResult};
use crate::config::BotSettings;
use crate::storage::{KeyRegistry, Namespace, StorageError, mask_token};

/// Maximum length of a key display name.
const MAX_KEY_NAME_LENGTH: usize = 32;

/// Executes key-management commands against the registry.
pub struct CommandHandler {
    /// Per-user key storage.
    registry: KeyRegistry,

    /// Settings providing the server-wide fallback keys.
    settings: Arc<BotSettings>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub const fn new(registry: KeyRegistry, settings: Arc<BotSettings>) -> Self {
        Self { registry, settings }
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command.
    pub async fn try_handle(&self, user_id: i64, message_text: &str) -> Option<CommandResult> {
        let command = BotCommand::parse(message_text)?;
        Some(self.execute(user_id, command).await)
    }

    /// Executes a parsed command.
    pub async fn execute(&self, user_id: i64, command: BotCommand) -> CommandResult {
        debug!(user_id, "Handling command: {}", command);

        let result = match command {
            BotCommand::Help => Ok(Self::handle_help()),
            BotCommand::SetKey { ns, name, token } => self.handle_set(user_id, ns, &name, &token).await,
            BotCommand::ListKeys(ns) => self.handle_list(user_id, ns).await,
            BotCommand::UseKey { ns, name } => self.handle_use(user_id, ns, &name).await,
            BotCommand::DeleteKey { ns, name } => self.handle_delete(user_id, ns, &name).await,
            BotCommand::ForgetMe => self.handle_forget(user_id).await,
            BotCommand::Usage(usage) => Ok(CommandResult::error(usage)),
        };

        let result = result.unwrap_or_else(|e| {
            error!(user_id, "Key storage failed: {}", e);
            CommandResult::error("❌ Key storage is unavailable right now. Please try again later.")
        });
        info!(user_id, success = result.success, "Command handled");
        result
    }

    fn handle_help() -> CommandResult {
        let mut lines = vec!["Cloud Key Bot commands".to_owned(), String::new()];

        for (cmd, args, desc) in BotCommand::all_commands() {
            let usage = if args.is_empty() {
                format!("/{cmd}")
            } else {
                format!("/{cmd} {args}")
            };
            lines.push(format!("  {usage} - {desc}"));
        }

        lines.push(String::new());
        lines.push("The first key you add becomes the active one.".to_owned());

        CommandResult::success(lines.join("\n"))
    }

    async fn handle_set(
        &self,
        user_id: i64,
        ns: Namespace,
        name: &str,
        token: &str,
    ) -> Result<CommandResult, StorageError> {
        if let Err(e) = validate_key_name(name) {
            return Ok(CommandResult::error(e));
        }

        let record = self.registry.load_record(user_id).await?;
        let previous = record.namespace(ns);
        let replaced = previous.keys.contains_key(name);
        let was_active = previous.active.as_deref() == Some(name);

        self.registry.add_or_replace(user_id, ns, name, token).await?;
        let active = self.registry.get_active_name(user_id, ns).await?;

        let verb = if replaced { "replaced" } else { "saved" };
        let mut message = format!(
            "✅ {} key '{name}' {verb}.\nToken: {}",
            ns.label(),
            mask_token(token)
        );
        if !was_active && active.as_deref() == Some(name) {
            message.push_str("\nThis key is now active.");
        }
        Ok(CommandResult::success(message))
    }

    async fn handle_list(&self, user_id: i64, ns: Namespace) -> Result<CommandResult, StorageError> {
        let record = self.registry.load_record(user_id).await?;
        let state = record.namespace(ns);
        let fallback = self.settings.fallback_token(ns).filter(|t| !t.is_empty());

        if state.is_empty() {
            let hint = if fallback.is_some() {
                "Commands will use the server default key."
            } else {
                "Use /setkey or /pskey to add one."
            };
            return Ok(CommandResult::success(format!(
                "No {} keys stored.\n{hint}",
                ns.label()
            )));
        }

        let mut lines = vec![format!("{} API keys:", ns.label())];
        for (name, token) in &state.keys {
            let marker = if state.active.as_deref() == Some(name.as_str()) {
                "→ "
            } else {
                "  "
            };
            lines.push(format!("{marker}{name}: {}", mask_token(token)));
        }

        let effective = self
            .registry
            .resolve_effective_token(user_id, ns, fallback)
            .await?;
        if let Some(token) = effective {
            lines.push(String::new());
            lines.push(format!("Effective key: {}", mask_token(&token)));
        }

        Ok(CommandResult::success(lines.join("\n")))
    }

    async fn handle_use(
        &self,
        user_id: i64,
        ns: Namespace,
        name: &str,
    ) -> Result<CommandResult, StorageError> {
        if self.registry.set_active(user_id, ns, name).await? {
            Ok(CommandResult::success(format!(
                "✓ Active {} key is now '{name}'.",
                ns.label()
            )))
        } else {
            Ok(CommandResult::error(format!(
                "Key not found: '{name}'. Use /{} to see stored keys.",
                list_command(ns)
            )))
        }
    }

    async fn handle_delete(
        &self,
        user_id: i64,
        ns: Namespace,
        name: &str,
    ) -> Result<CommandResult, StorageError> {
        if !self.registry.delete(user_id, ns, name).await? {
            return Ok(CommandResult::error(format!(
                "Key not found: '{name}'. Use /{} to see stored keys.",
                list_command(ns)
            )));
        }

        let message = match self.registry.get_active_name(user_id, ns).await? {
            Some(active) => format!("🗑️ Deleted '{name}'. Active {} key: '{active}'.", ns.label()),
            None => format!("🗑️ Deleted '{name}'. No {} keys left.", ns.label()),
        };
        Ok(CommandResult::success(message))
    }

    async fn handle_forget(&self, user_id: i64) -> Result<CommandResult, StorageError> {
        if self.registry.delete_all(user_id).await? {
            Ok(CommandResult::success(
                "🗑️ All of your stored keys have been deleted.\n\
                 The server default keys (if any) will be used from now on.",
            ))
        } else {
            Ok(CommandResult::error("You have no stored keys."))
        }
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

const fn list_command(ns: Namespace) -> &'static str {
    match ns {
        Namespace::DigitalOcean => "mykey",
        Namespace::Paperspace => "mypsk",
    }
}

/// Validates a key display name.
fn validate_key_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Key name cannot be empty.".to_owned());
    }

    let len = name.chars().count();
    if len > MAX_KEY_NAME_LENGTH {
        return Err(format!(
            "Key name is too long: {len} characters (max {MAX_KEY_NAME_LENGTH})."
        ));
    }

    if name.chars().any(char::is_control) {
        return Err("Key name cannot contain control characters.".to_owned());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::storage::JsonFileBackend;

    fn handler(dir: &tempfile::TempDir, do_fallback: Option<&str>) -> CommandHandler {
        let path = dir.path().join("keys.json");
        let settings = BotSettings {
            bot_token: "123:abc".to_owned(),
            allowed_user_ids: vec![42],
            do_fallback_token: do_fallback.map(str::to_owned),
            ps_fallback_token: None,
            storage: StorageConfig::JsonFile { path: path.clone() },
        };
        let registry = KeyRegistry::new(Arc::new(JsonFileBackend::new(path)));
        CommandHandler::new(registry, Arc::new(settings))
    }

    #[test]
    fn test_validate_key_name() {
        assert!(validate_key_name("Work").is_ok());
        assert!(validate_key_name("My Team").is_ok());
        assert!(validate_key_name("").is_err());
        assert!(validate_key_name(&"a".repeat(33)).is_err());
        assert!(validate_key_name("bad\nname").is_err());
    }

    #[tokio::test]
    async fn test_non_command_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);
        assert!(handler.try_handle(42, "hello there").await.is_none());
    }

    #[tokio::test]
    async fn test_set_then_list_masks_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);

        let result = handler
            .try_handle(42, "/setkey Work dop_v1_abcdef123456")
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.message.contains("now active"));
        assert!(!result.message.contains("dop_v1_abcdef123456"));

        let list = handler.try_handle(42, "/mykey").await.unwrap();
        assert!(list.success);
        assert!(list.message.contains("→ Work: dop_v1…3456"));
        assert!(!list.message.contains("abcdef"));
    }

    #[tokio::test]
    async fn test_second_key_is_not_activated() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);
        handler.try_handle(42, "/pskey Team ps_token_one").await.unwrap();
        let second = handler.try_handle(42, "/pskey Solo ps_token_two").await.unwrap();
        assert!(!second.message.contains("now active"));

        let replaced = handler.try_handle(42, "/pskey Solo ps_token_new").await.unwrap();
        assert!(replaced.message.contains("replaced"));
    }

    #[tokio::test]
    async fn test_replacing_active_key_keeps_quiet_about_activation() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);
        handler.try_handle(42, "/setkey Work tok_old").await.unwrap();

        let replaced = handler.try_handle(42, "/setkey Work tok_new").await.unwrap();
        assert!(replaced.success);
        assert!(replaced.message.contains("replaced"));
        assert!(!replaced.message.contains("now active"));
    }

    #[tokio::test]
    async fn test_use_and_delete_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);

        let used = handler.try_handle(42, "/usekey Ghost").await.unwrap();
        assert!(!used.success);
        assert!(used.message.contains("/mykey"));

        let deleted = handler.try_handle(42, "/deletepsk Ghost").await.unwrap();
        assert!(!deleted.success);
        assert!(deleted.message.contains("/mypsk"));
    }

    #[tokio::test]
    async fn test_delete_reports_new_active() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);
        handler.try_handle(42, "/setkey Work tok_abc").await.unwrap();
        handler.try_handle(42, "/setkey Home tok_xyz").await.unwrap();

        let deleted = handler.try_handle(42, "/deletekey Work").await.unwrap();
        assert!(deleted.success);
        assert!(deleted.message.contains("Active DigitalOcean key: 'Home'"));

        let last = handler.try_handle(42, "/deletekey Home").await.unwrap();
        assert!(last.message.contains("No DigitalOcean keys left"));
    }

    #[tokio::test]
    async fn test_list_empty_mentions_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let with_default = handler(&dir, Some("dop_v1_server_default"));
        let list = with_default.try_handle(42, "/mykey").await.unwrap();
        assert!(list.message.contains("server default"));

        let list = with_default.try_handle(42, "/mypsk").await.unwrap();
        assert!(list.message.contains("Use /setkey"));
    }

    #[tokio::test]
    async fn test_forget_me() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);
        assert!(!handler.try_handle(42, "/forgetme").await.unwrap().success);

        handler.try_handle(42, "/setkey tok_abc").await.unwrap();
        assert!(handler.try_handle(42, "/forgetme").await.unwrap().success);
        let list = handler.try_handle(42, "/mykey").await.unwrap();
        assert!(list.message.starts_with("No DigitalOcean keys stored"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);
        std::fs::write(dir.path().join("keys.json"), "{broken").unwrap();

        let result = handler.try_handle(42, "/mykey").await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_usage_message() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(&dir, None);
        let result = handler.try_handle(42, "/usepsk").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Usage: /usepsk <name>");
    }
}
