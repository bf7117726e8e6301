//! Configuration for Courier bots.
//!
//! [`BotCreationOptions`] are loaded in layers by [`ConfigLoader`] and checked
//! by [`validate_options`] before a bot is built.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_options, load_options_from_file};
pub use schema::{
    BotCreationOptions, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig,
};
pub use validation::{
    MAX_DESCRIPTION_LEN, MAX_NAME_LEN, MAX_SHORT_DESCRIPTION_LEN, validate_options,
};
