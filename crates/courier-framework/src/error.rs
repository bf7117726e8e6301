//! Error types for the Courier framework.

use thiserror::Error;

/// Errors raised while registering commands.
///
/// Invalid command names are not an error: they are kept in the registry and
/// only reported through a log diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A command with the same name is already registered.
    #[error("command '/{0}' is already registered")]
    DuplicateCommand(String),
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;
