//! # Courier Core
//!
//! The update model and collaborator interfaces of the Courier bot engine.
//!
//! This crate deliberately contains no routing logic. It defines:
//!
//! - **Update model**: the [`Update`] tagged union and its payload [`types`]
//! - **Outbound API**: the [`BotApi`] capability handed to the engine and handlers
//! - **Transport**: [`Transport`], [`Session`], [`UpdateConsumer`] and the
//!   pull-style [`UpdateSource`] with its [`PollingTransport`] adapter
//! - **Errors**: [`TransportError`] and [`ApiError`]
//!
//! ```text
//! ┌───────────┐  Vec<Update>  ┌────────────────┐
//! │ Transport │──────────────▶│ UpdateConsumer │  (courier-framework Dispatcher)
//! └───────────┘               └────────────────┘
//!       ▲                              │
//!       │ connect / close              ▼
//! ┌───────────┐                  ┌──────────┐
//! │    Bot    │─────────────────▶│  BotApi  │
//! └───────────┘   metadata sync  └──────────┘
//! ```

pub mod api;
pub mod error;
pub mod transport;
pub mod types;
pub mod update;

pub use api::{BotApi, BotCommand, BoxedApi};
pub use error::{ApiError, ApiResult, TransportError, TransportResult};
pub use transport::{
    BoxedConsumer, BoxedSession, BoxedTransport, PollingTransport, Session, Transport,
    UpdateConsumer, UpdateSource,
};
pub use types::{
    BusinessConnection, BusinessMessagesDeleted, CallbackQuery, Chat, ChatJoinRequest, ChatKind,
    ChatMemberUpdated, ChosenInlineResult, InlineQuery, Message, Poll, PollAnswer, PollOption,
    PreCheckoutQuery, ShippingQuery, User,
};
pub use update::{COMMAND_MARKER, Update, UpdateKind, UpdateType};
