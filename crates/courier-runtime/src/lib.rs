//! Courier Runtime - lifecycle layer for the Courier bot engine.
//!
//! This crate provides:
//! - [`Bot`], which owns commands and listeners and drives the
//!   `Created → Started → Stopped` lifecycle
//! - Metadata and command menu synchronization on start
//! - Layered configuration of [`BotCreationOptions`] (files, environment,
//!   code) with validation
//! - Logging setup on `tracing-subscriber`
//!
//! ```ignore
//! use courier_runtime::{Bot, StartOptions, config::load_options};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Bot::new(load_options()?, api, transport)?;
//!     bot.add_listener(MyListener);
//!
//!     bot.start(StartOptions::default().stop_on_shutdown_signal(true)).await?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! # courier.toml
//! token = "123456:ABC"
//! name = "Courier"
//! run_commands_through_on_message = false
//!
//! [dispatch]
//! policy = "pooled"
//! max_in_flight = 64
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;

// Re-exports
pub use bot::{Bot, BotState, StartOptions, shutdown_signal};
pub use config::{
    BotCreationOptions, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, Profile,
};
pub use error::{BotError, BotResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use metadata::{MetadataField, SyncReport, sync_command_menu, sync_metadata};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
