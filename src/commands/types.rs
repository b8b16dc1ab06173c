//! Command types and definitions.

use std::fmt;

use crate::storage::{DEFAULT_KEY_NAME, Namespace};

/// Available bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Show help information.
    Help,

    /// Store (or replace) a named key.
    SetKey {
        ns: Namespace,
        name: String,
        token: String,
    },

    /// List stored keys and the active one.
    ListKeys(Namespace),

    /// Switch the active key.
    UseKey { ns: Namespace, name: String },

    /// Delete one named key.
    DeleteKey { ns: Namespace, name: String },

    /// Delete every key the user has stored, in both namespaces.
    ForgetMe,

    /// A known command was sent without its required arguments.
    Usage(&'static str),
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Returns `None` if the message is not a known command. A `@botname`
    /// suffix on the command is ignored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;

        let (cmd, args) = match rest.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd, args.trim()),
            None => (rest, ""),
        };
        let cmd = cmd.split('@').next().unwrap_or(cmd).to_lowercase();

        match cmd.as_str() {
            "start" | "help" => Some(Self::Help),
            "setkey" => Some(Self::parse_set(Namespace::DigitalOcean, args)),
            "pskey" => Some(Self::parse_set(Namespace::Paperspace, args)),
            "mykey" | "keys" => Some(Self::ListKeys(Namespace::DigitalOcean)),
            "mypsk" | "pskeys" => Some(Self::ListKeys(Namespace::Paperspace)),
            "usekey" => Some(Self::parse_named(Namespace::DigitalOcean, args, false)),
            "usepsk" => Some(Self::parse_named(Namespace::Paperspace, args, false)),
            "deletekey" | "delkey" => Some(Self::parse_named(Namespace::DigitalOcean, args, true)),
            "deletepsk" | "delpsk" => Some(Self::parse_named(Namespace::Paperspace, args, true)),
            "forgetme" => Some(Self::ForgetMe),
            _ => None,
        }
    }

    /// Parses `<name> <token>` or `<token>`; the token is the last word.
    fn parse_set(ns: Namespace, args: &str) -> Self {
        let Some((name, token)) = args
            .rsplit_once(char::is_whitespace)
            .map(|(name, token)| (name.trim(), token.trim()))
            .or_else(|| (!args.is_empty()).then_some(("", args)))
        else {
            return Self::Usage(usage_for(ns, "set"));
        };

        let name = if name.is_empty() { DEFAULT_KEY_NAME } else { name };
        Self::SetKey {
            ns,
            name: name.to_owned(),
            token: token.to_owned(),
        }
    }

    fn parse_named(ns: Namespace, args: &str, delete: bool) -> Self {
        let action = if delete { "delete" } else { "use" };
        if args.is_empty() {
            return Self::Usage(usage_for(ns, action));
        }
        let name = args.to_owned();
        if delete {
            Self::DeleteKey { ns, name }
        } else {
            Self::UseKey { ns, name }
        }
    }

    /// Returns true if the message carrying this command holds a secret and
    /// should be removed from the chat.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::SetKey { .. })
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::SetKey { ns: Namespace::DigitalOcean, .. } => "setkey",
            Self::SetKey { ns: Namespace::Paperspace, .. } => "pskey",
            Self::ListKeys(Namespace::DigitalOcean) => "mykey",
            Self::ListKeys(Namespace::Paperspace) => "mypsk",
            Self::UseKey { ns: Namespace::DigitalOcean, .. } => "usekey",
            Self::UseKey { ns: Namespace::Paperspace, .. } => "usepsk",
            Self::DeleteKey { ns: Namespace::DigitalOcean, .. } => "deletekey",
            Self::DeleteKey { ns: Namespace::Paperspace, .. } => "deletepsk",
            Self::ForgetMe => "forgetme",
            Self::Usage(_) => "usage",
        }
    }

    /// Returns all available commands as `(command, arguments, description)`.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("setkey", "[name] <token>", "DO: add or replace an API key"),
            ("mykey", "", "DO: list stored API keys"),
            ("usekey", "<name>", "DO: switch the active API key"),
            ("deletekey", "<name>", "DO: delete an API key"),
            ("pskey", "[name] <token>", "PS: add or replace an API key"),
            ("mypsk", "", "PS: list stored API keys"),
            ("usepsk", "<name>", "PS: switch the active API key"),
            ("deletepsk", "<name>", "PS: delete an API key"),
            ("forgetme", "", "Delete all of your stored keys"),
            ("help", "", "Show this help message"),
        ]
    }
}

fn usage_for(ns: Namespace, action: &str) -> &'static str {
    match (ns, action) {
        (Namespace::DigitalOcean, "set") => "Usage: /setkey [name] <token>",
        (Namespace::Paperspace, "set") => "Usage: /pskey [name] <token>",
        (Namespace::DigitalOcean, "use") => "Usage: /usekey <name>",
        (Namespace::Paperspace, "use") => "Usage: /usepsk <name>",
        (Namespace::DigitalOcean, _) => "Usage: /deletekey <name>",
        (Namespace::Paperspace, _) => "Usage: /deletepsk <name>",
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never print the token.
            Self::SetKey { name, .. } => write!(f, "{} {name} <token>", self.name()),
            Self::UseKey { name, .. } | Self::DeleteKey { name, .. } => {
                write!(f, "{} {name}", self.name())
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DO: Namespace = Namespace::DigitalOcean;
    const PS: Namespace = Namespace::Paperspace;

    #[test]
    fn test_parse_help() {
        assert_eq!(BotCommand::parse("/help"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Help));
    }

    #[test]
    fn test_parse_setkey_with_name() {
        assert_eq!(
            BotCommand::parse("/setkey Work dop_v1_abc"),
            Some(BotCommand::SetKey {
                ns: DO,
                name: "Work".to_owned(),
                token: "dop_v1_abc".to_owned(),
            })
        );
    }

    #[test]
    fn test_parse_setkey_name_with_spaces() {
        assert_eq!(
            BotCommand::parse("/pskey My Team  ps_123"),
            Some(BotCommand::SetKey {
                ns: PS,
                name: "My Team".to_owned(),
                token: "ps_123".to_owned(),
            })
        );
    }

    #[test]
    fn test_parse_setkey_token_only() {
        assert_eq!(
            BotCommand::parse("/setkey dop_v1_abc"),
            Some(BotCommand::SetKey {
                ns: DO,
                name: DEFAULT_KEY_NAME.to_owned(),
                token: "dop_v1_abc".to_owned(),
            })
        );
    }

    #[test]
    fn test_parse_missing_args() {
        assert!(matches!(BotCommand::parse("/setkey"), Some(BotCommand::Usage(_))));
        assert!(matches!(BotCommand::parse("/usepsk   "), Some(BotCommand::Usage(_))));
        assert!(matches!(BotCommand::parse("/deletekey"), Some(BotCommand::Usage(_))));
    }

    #[test]
    fn test_parse_use_and_delete() {
        assert_eq!(
            BotCommand::parse("/usekey Home"),
            Some(BotCommand::UseKey {
                ns: DO,
                name: "Home".to_owned()
            })
        );
        assert_eq!(
            BotCommand::parse("/deletepsk Team"),
            Some(BotCommand::DeleteKey {
                ns: PS,
                name: "Team".to_owned()
            })
        );
    }

    #[test]
    fn test_parse_bot_suffix_and_case() {
        assert_eq!(
            BotCommand::parse("/MyKey@cloud_key_bot"),
            Some(BotCommand::ListKeys(DO))
        );
        assert_eq!(BotCommand::parse("  /mypsk  "), Some(BotCommand::ListKeys(PS)));
    }

    #[test]
    fn test_parse_non_commands() {
        assert_eq!(BotCommand::parse("hello"), None);
        assert_eq!(BotCommand::parse("/create droplet"), None);
        assert_eq!(BotCommand::parse(""), None);
    }

    #[test]
    fn test_display_hides_token() {
        let cmd = BotCommand::parse("/setkey Work dop_v1_secret").unwrap();
        assert!(cmd.is_sensitive());
        assert_eq!(cmd.to_string(), "setkey Work <token>");
        assert!(!BotCommand::ForgetMe.is_sensitive());
    }
}
