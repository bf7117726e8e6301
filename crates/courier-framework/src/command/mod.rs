//! Named slash-commands and their registry.
//!
//! A [`Command`] is a name, a menu description and an async handler. The
//! [`CommandRegistry`] keeps commands in registration order and resolves
//! message tokens such as `/ping` or `/ping@my_bot` to them.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_framework::{Command, CommandRegistry};
//!
//! let registry = CommandRegistry::new();
//! registry.register(Command::new("ping", "Replies with pong", |ctx| async move {
//!     ctx.reply("pong").await?;
//!     Ok(())
//! }))?;
//!
//! registry.set_username(Some("my_bot"));
//! assert!(registry.lookup("/ping@my_bot").is_some());
//! assert!(registry.lookup("/ping@other_bot").is_none());
//! ```

mod args;
mod context;

pub use args::{Invocation, parse_invocation, shell_split, split_mention};
pub use context::CommandContext;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use courier_core::BotCommand;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{RegistrationError, RegistrationResult};

/// Longest command name the upstream menu accepts.
pub const MAX_COMMAND_NAME_LEN: usize = 32;

/// The future returned by a command handler.
pub type CommandFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A type-erased command handler.
pub type CommandHandler = Arc<dyn Fn(CommandContext) -> CommandFuture + Send + Sync>;

/// Returns `true` if `name` is usable in the command menu.
///
/// Valid names are non-empty, at most [`MAX_COMMAND_NAME_LEN`] characters and
/// consist only of lowercase ASCII letters, digits and underscores.
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_COMMAND_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

// ============================================================================
// Command
// ============================================================================

/// A named command with its handler.
#[derive(Clone)]
pub struct Command {
    name: String,
    description: String,
    handler: CommandHandler,
}

impl Command {
    /// Creates a command from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            handler: Arc::new(move |ctx| handler(ctx).boxed()),
        }
    }

    /// The command name without the leading marker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The menu description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the name passes [`validate_name`].
    pub fn is_valid(&self) -> bool {
        validate_name(&self.name)
    }

    /// Runs the handler.
    pub fn invoke(&self, ctx: CommandContext) -> CommandFuture {
        (self.handler)(ctx)
    }

    fn to_menu_entry(&self) -> BotCommand {
        BotCommand::new(self.name.clone(), self.description.clone())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CommandRegistry
// ============================================================================

/// Ordered, concurrently readable set of commands.
///
/// Writers replace the backing vector; readers work on an [`Arc`] snapshot and
/// never block dispatch for longer than a pointer clone.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<Arc<Vec<Command>>>,
    /// The bot's own username, without `@`.
    username: RwLock<Option<String>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    ///
    /// A name that fails [`validate_name`] is still registered, so the handler
    /// stays reachable, but it is left out of [`menu`](Self::menu).
    pub fn register(&self, command: Command) -> RegistrationResult<()> {
        let mut commands = self.commands.write();
        if commands.iter().any(|c| c.name == command.name) {
            return Err(RegistrationError::DuplicateCommand(command.name));
        }

        if command.is_valid() {
            debug!(command = %command.name, "Registered command");
        } else {
            warn!(
                command = %command.name,
                "Command name is not menu-compatible (expected 1-{MAX_COMMAND_NAME_LEN} of [a-z0-9_]); \
                 it stays callable but will not be published"
            );
        }

        Arc::make_mut(&mut *commands).push(command);
        Ok(())
    }

    /// Removes a command by name and returns it.
    pub fn unregister(&self, name: &str) -> Option<Command> {
        let mut commands = self.commands.write();
        let index = commands.iter().position(|c| c.name == name)?;
        Some(Arc::make_mut(&mut *commands).remove(index))
    }

    /// Sets the username that `@mention`ed tokens must address.
    ///
    /// A leading `@` is ignored.
    pub fn set_username(&self, username: Option<&str>) {
        *self.username.write() = username
            .map(|u| u.trim_start_matches('@'))
            .filter(|u| !u.is_empty())
            .map(str::to_string);
    }

    /// The username set with [`set_username`](Self::set_username).
    pub fn username(&self) -> Option<String> {
        self.username.read().clone()
    }

    /// Resolves a message token such as `/ping` or `/ping@my_bot`.
    ///
    /// A token with a mention resolves only when the mention names this bot
    /// (case-insensitively). Without a configured username, mentioned tokens
    /// never resolve.
    pub fn lookup(&self, token: &str) -> Option<Command> {
        let (name, mention) = split_mention(token);
        if let Some(mention) = mention {
            let username = self.username.read();
            if !username
                .as_deref()
                .is_some_and(|own| own.eq_ignore_ascii_case(mention))
            {
                return None;
            }
        }
        self.snapshot().iter().find(|c| c.name == name).cloned()
    }

    /// Menu entries for every valid-named command, in registration order.
    pub fn menu(&self) -> Vec<BotCommand> {
        self.snapshot()
            .iter()
            .filter(|c| c.is_valid())
            .map(Command::to_menu_entry)
            .collect()
    }

    /// All registered names, valid or not, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.snapshot().iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// A point-in-time view of the registered commands.
    pub fn snapshot(&self) -> Arc<Vec<Command>> {
        Arc::clone(&self.commands.read())
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Command {
        Command::new(name, format!("{name} command"), |_ctx| async { Ok::<_, anyhow::Error>(()) })
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("ping"));
        assert!(validate_name("set_lang2"));
        assert!(!validate_name(""));
        assert!(!validate_name("Ping"));
        assert!(!validate_name("with-dash"));
        assert!(!validate_name("emoji🙂"));
        assert!(validate_name(&"a".repeat(MAX_COMMAND_NAME_LEN)));
        assert!(!validate_name(&"a".repeat(MAX_COMMAND_NAME_LEN + 1)));
    }

    #[test]
    fn test_lookup_registered_and_unknown() {
        let registry = CommandRegistry::new();
        for name in ["start", "help", "ping"] {
            registry.register(noop(name)).unwrap();
        }

        for name in ["start", "help", "ping"] {
            let found = registry.lookup(&format!("/{name}")).unwrap();
            assert_eq!(found.name(), name);
        }
        assert!(registry.lookup("/unknown").is_none());
        assert!(registry.lookup("/").is_none());
    }

    #[test]
    fn test_lookup_honours_only_own_mention() {
        let registry = CommandRegistry::new();
        registry.register(noop("ping")).unwrap();
        assert!(registry.lookup("/ping@my_bot").is_none());

        registry.set_username(Some("@My_Bot"));
        assert_eq!(registry.username().as_deref(), Some("My_Bot"));
        assert!(registry.lookup("/ping@my_bot").is_some());
        assert!(registry.lookup("/ping@some_other_bot").is_none());
        assert!(registry.lookup("/ping").is_some());

        registry.set_username(None);
        assert!(registry.lookup("/ping@my_bot").is_none());
    }

    #[test]
    fn test_invalid_name_registered_but_not_in_menu() {
        let registry = CommandRegistry::new();
        registry.register(noop("ok")).unwrap();
        registry.register(noop("Bad-Name")).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("/Bad-Name").is_some());
        assert_eq!(registry.menu(), vec![BotCommand::new("ok", "ok command")]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = CommandRegistry::new();
        registry.register(noop("ping")).unwrap();
        let err = registry.register(noop("ping")).unwrap_err();
        assert_eq!(err, RegistrationError::DuplicateCommand("ping".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_keeps_order() {
        let registry = CommandRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(noop(name)).unwrap();
        }
        let snapshot = registry.snapshot();

        assert_eq!(registry.unregister("b").unwrap().name(), "b");
        assert!(registry.unregister("b").is_none());
        assert_eq!(registry.names(), vec!["a", "c"]);
        assert_eq!(snapshot.len(), 3);
    }
}
