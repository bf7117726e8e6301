//! # Courier
//!
//! An update dispatch engine for Telegram-style chat bots.
//!
//! ## Overview
//!
//! Courier receives batches of updates from a transport, routes each update
//! to a matching slash-command and to every subscribed listener, and manages
//! the bot's start/stop lifecycle, including keeping the bot's name,
//! descriptions and command menu in sync with the remote service.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ batch ┌────────────┐ unit ┌────────┐──▶ Command handler
//! │ Transport │──────▶│ Dispatcher │─────▶│ Router │
//! └───────────┘       └────────────┘      └────────┘──▶ Listener 1, 2, ...
//!       ▲                                                    │
//!       └──────────── Bot (start / stop) ◀─── BotApi ◀───────┘
//! ```
//!
//! - **Transport**: opens a session that pushes update batches
//! - **Dispatcher**: turns each update into an independent dispatch unit
//! - **Router**: runs the command route first, then the listeners in order
//! - **Bot**: owns the registries and drives the lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Listener for Greeter {
//!     async fn on_message(&self, api: &BoxedApi, message: &Message) -> ListenerResult {
//!         api.send_message(message.chat.id, "hello").await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Bot::new(load_options()?, api, transport)?;
//!     bot.add_listener(Greeter);
//!     bot.add_command(Command::new("ping", "Replies with pong", |ctx| async move {
//!         ctx.reply("pong").await?;
//!         Ok(())
//!     }))?;
//!
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `command`: typed command arguments with clap (default)
//! - `toml-config`: `courier.toml` configuration files (default)
//! - `yaml-config`: `courier.yaml` configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::config::{ConfigLoader, load_options, load_options_from_file};
    pub use courier_runtime::{
        Bot, BotCreationOptions, BotError, BotResult, BotState, StartOptions,
    };

    // Handlers
    pub use async_trait::async_trait;
    pub use courier_framework::{
        Command, CommandContext, ConcurrencyPolicy, DispatchConfig, Listener, ListenerId,
        ListenerResult,
    };

    // Collaborator traits for custom transports and API clients
    pub use courier_core::{
        BotApi, BotCommand, BoxedApi, PollingTransport, Transport, Update, UpdateKind,
        UpdateSource, UpdateType,
    };

    // Payload types
    pub use courier_core::{CallbackQuery, Chat, InlineQuery, Message, User};
}
