//! Runtime error types.

use courier_core::{ApiError, TransportError};
use courier_framework::RegistrationError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the bot lifecycle.
#[derive(Error, Debug)]
pub enum BotError {
    /// Opening or closing the transport session failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An outbound API call made by the lifecycle failed.
    #[error("API call {operation} failed: {source}")]
    Api {
        operation: &'static str,
        #[source]
        source: ApiError,
    },

    /// A command could not be registered.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// The options did not pass validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BotError {
    /// Wraps an API failure of `operation`.
    pub fn api(operation: &'static str, source: ApiError) -> Self {
        Self::Api { operation, source }
    }
}

/// Result type for lifecycle operations.
pub type BotResult<T> = Result<T, BotError>;
