//! # Courier Framework
//!
//! Routing components between the transport and user code.
//!
//! This layer provides:
//! - [`CommandRegistry`] of named slash-commands with menu export
//! - [`Listener`] trait with one async method per update kind, kept in a
//!   [`ListenerSet`]
//! - [`Router`], which sends one update to the command route and then to the
//!   listeners, isolating handler failures
//! - [`Dispatcher`], the [`UpdateConsumer`](courier_core::UpdateConsumer)
//!   that schedules one dispatch unit per update
//! - Clap-based argument parsing for commands (with `command` feature)

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod router;

pub use command::{
    Command, CommandContext, CommandFuture, CommandHandler, CommandRegistry, Invocation,
    MAX_COMMAND_NAME_LEN, parse_invocation, shell_split, validate_name,
};
pub use dispatcher::{ConcurrencyPolicy, DispatchConfig, Dispatcher};
pub use error::{RegistrationError, RegistrationResult};
pub use listener::{BoxedListener, Listener, ListenerEntry, ListenerId, ListenerResult, ListenerSet};
pub use router::{DispatchHook, RouteReport, Router, deliver};

#[cfg(feature = "command")]
pub use clap;
