//! Outbound API capability.
//!
//! The engine never talks to the network itself. Everything it needs from the
//! remote service (command menu, bot name and descriptions) goes through the
//! [`BotApi`] trait, and the same handle is passed to user handlers so they can
//! issue their own calls.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ApiResult;

/// One entry of the bot's command menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    /// Command name without the leading marker.
    pub command: String,
    /// Description shown next to the command in the client menu.
    pub description: String,
}

impl BotCommand {
    /// Creates a new menu entry.
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// The outbound API used by the engine and by handlers.
///
/// Implementations are expected to be cheap to share; the engine holds them as
/// [`BoxedApi`]. All calls are best-effort and never retried by the engine.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Calls a raw API method with JSON parameters and returns the raw result.
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value>;

    /// Replaces the bot's command menu.
    async fn set_my_commands(&self, commands: &[BotCommand]) -> ApiResult<()>;

    /// Clears the bot's command menu.
    async fn delete_my_commands(&self) -> ApiResult<()>;

    /// Reads the bot's display name.
    async fn get_my_name(&self) -> ApiResult<String>;

    /// Sets the bot's display name.
    async fn set_my_name(&self, name: &str) -> ApiResult<()>;

    /// Reads the bot's description.
    async fn get_my_description(&self) -> ApiResult<String>;

    /// Sets the bot's description.
    async fn set_my_description(&self, description: &str) -> ApiResult<()>;

    /// Reads the bot's short description.
    async fn get_my_short_description(&self) -> ApiResult<String>;

    /// Sets the bot's short description.
    async fn set_my_short_description(&self, short_description: &str) -> ApiResult<()>;

    /// Sends a text message to a chat.
    ///
    /// The default implementation goes through [`call`](Self::call) with the
    /// `sendMessage` method and returns the raw result.
    async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<Value> {
        self.call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await
    }
}

/// A shared [`BotApi`] trait object.
pub type BoxedApi = Arc<dyn BotApi>;
