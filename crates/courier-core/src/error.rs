//! Unified error types for the Courier core.
//!
//! Framework-level errors (like `RegistrationError`) are defined in
//! `courier-framework`; lifecycle errors live in `courier-runtime`.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by a [`Transport`](crate::Transport) or [`Session`](crate::Session).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport refused to open a session.
    #[error("failed to open session: {reason}")]
    ConnectFailed {
        /// Reason for failure.
        reason: String,
    },

    /// The session was already closed.
    #[error("session closed")]
    Closed,

    /// The transport rejected the bot token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Fetching a batch of updates failed.
    #[error("failed to fetch updates: {0}")]
    FetchFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The API endpoint could not be reached.
    #[error("API unreachable: {0}")]
    Unreachable(String),
    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,
    /// The API returned an error.
    #[error("API error ({code}): {description}")]
    Rejected { code: i64, description: String },
    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    SerializationError(String),
    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
