//! The value handed to command handlers.

use std::fmt;
use std::sync::Arc;

use courier_core::{ApiResult, BoxedApi, Message};
use serde_json::Value;

/// Everything a command handler gets to see about one invocation.
///
/// Cheap to clone; the message is shared.
#[derive(Clone)]
pub struct CommandContext {
    update_id: i64,
    message: Arc<Message>,
    command: String,
    args: Vec<String>,
    api: BoxedApi,
}

impl CommandContext {
    /// Creates a context for one command invocation.
    pub fn new(
        update_id: i64,
        message: Message,
        command: impl Into<String>,
        args: Vec<String>,
        api: BoxedApi,
    ) -> Self {
        Self {
            update_id,
            message: Arc::new(message),
            command: command.into(),
            args,
            api,
        }
    }

    /// Identifier of the triggering update.
    pub fn update_id(&self) -> i64 {
        self.update_id
    }

    /// The triggering message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The chat the command was sent in.
    pub fn chat_id(&self) -> i64 {
        self.message.chat.id
    }

    /// The registered command name, without marker or mention.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments after the command token, split with shell quoting rules.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The full message text.
    pub fn text(&self) -> &str {
        self.message.text().unwrap_or_default()
    }

    /// The outbound API handle.
    pub fn api(&self) -> &BoxedApi {
        &self.api
    }

    /// Sends `text` to the chat the command came from.
    pub async fn reply(&self, text: &str) -> ApiResult<Value> {
        self.api.send_message(self.chat_id(), text).await
    }

    /// Parses the arguments into a clap command.
    ///
    /// The command name is used as the program name, so `--help` output reads
    /// naturally. Help and version requests come back as a [`clap::Error`]
    /// whose rendered text is meant to be sent back to the user.
    #[cfg(feature = "command")]
    pub fn parse<T: clap::Parser>(&self) -> Result<T, clap::Error> {
        let argv = std::iter::once(self.command.as_str()).chain(self.args.iter().map(String::as_str));
        T::try_parse_from(argv)
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("update_id", &self.update_id)
            .field("chat_id", &self.message.chat.id)
            .field("command", &self.command)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}
