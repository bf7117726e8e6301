//! The inbound update model.
//!
//! An [`Update`] is one decoded inbound occurrence. Exactly one
//! [`UpdateKind`] variant is populated per update; the variant decides which
//! listener method fires.
//!
//! ```text
//! {"update_id": 42, "message": {...}}
//!      │                 │
//!      └── update_id     └── UpdateKind::Message(Message)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    BusinessConnection, BusinessMessagesDeleted, CallbackQuery, ChatJoinRequest,
    ChatMemberUpdated, ChosenInlineResult, InlineQuery, Message, Poll, PollAnswer,
    PreCheckoutQuery, ShippingQuery,
};

/// The leading character that marks a message as a command invocation.
pub const COMMAND_MARKER: char = '/';

// ============================================================================
// Update
// ============================================================================

/// One inbound update.
///
/// Updates are immutable once received: the dispatch loop owns them for the
/// duration of routing and drops them afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonic identifier assigned by the upstream service.
    pub update_id: i64,
    /// The single populated kind.
    #[serde(flatten)]
    pub kind: UpdateKind,
}

impl Update {
    /// Creates a new update.
    pub fn new(update_id: i64, kind: UpdateKind) -> Self {
        Self { update_id, kind }
    }

    /// Returns the classification of this update.
    pub fn update_type(&self) -> UpdateType {
        self.kind.update_type()
    }

    /// Returns the message and its text if this update is a plain message whose
    /// text starts with the [`COMMAND_MARKER`].
    ///
    /// Only `message` updates are considered; edited messages and channel
    /// posts never take the command route.
    pub fn as_command(&self) -> Option<(&Message, &str)> {
        match &self.kind {
            UpdateKind::Message(message) => message
                .text()
                .filter(|text| text.starts_with(COMMAND_MARKER))
                .map(|text| (message, text)),
            _ => None,
        }
    }
}

// ============================================================================
// UpdateKind
// ============================================================================

/// The closed set of inbound update kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    BusinessConnection(BusinessConnection),
    BusinessMessage(Message),
    EditedBusinessMessage(Message),
    DeletedBusinessMessages(BusinessMessagesDeleted),
    InlineQuery(InlineQuery),
    ChosenInlineResult(ChosenInlineResult),
    CallbackQuery(CallbackQuery),
    ShippingQuery(ShippingQuery),
    PreCheckoutQuery(PreCheckoutQuery),
    Poll(Poll),
    PollAnswer(PollAnswer),
    MyChatMember(ChatMemberUpdated),
    ChatMember(ChatMemberUpdated),
    ChatJoinRequest(ChatJoinRequest),
    /// A kind this version does not know about; the raw payload is kept.
    #[serde(untagged)]
    Unknown(Value),
}

impl UpdateKind {
    /// Returns the classification label of this kind.
    pub fn update_type(&self) -> UpdateType {
        match self {
            Self::Message(_) => UpdateType::Message,
            Self::EditedMessage(_) => UpdateType::EditedMessage,
            Self::ChannelPost(_) => UpdateType::ChannelPost,
            Self::EditedChannelPost(_) => UpdateType::EditedChannelPost,
            Self::BusinessConnection(_) => UpdateType::BusinessConnection,
            Self::BusinessMessage(_) => UpdateType::BusinessMessage,
            Self::EditedBusinessMessage(_) => UpdateType::EditedBusinessMessage,
            Self::DeletedBusinessMessages(_) => UpdateType::DeletedBusinessMessages,
            Self::InlineQuery(_) => UpdateType::InlineQuery,
            Self::ChosenInlineResult(_) => UpdateType::ChosenInlineResult,
            Self::CallbackQuery(_) => UpdateType::CallbackQuery,
            Self::ShippingQuery(_) => UpdateType::ShippingQuery,
            Self::PreCheckoutQuery(_) => UpdateType::PreCheckoutQuery,
            Self::Poll(_) => UpdateType::Poll,
            Self::PollAnswer(_) => UpdateType::PollAnswer,
            Self::MyChatMember(_) => UpdateType::MyChatMember,
            Self::ChatMember(_) => UpdateType::ChatMember,
            Self::ChatJoinRequest(_) => UpdateType::ChatJoinRequest,
            Self::Unknown(_) => UpdateType::Unknown,
        }
    }
}

// ============================================================================
// UpdateType
// ============================================================================

/// Classification label of a routed update.
///
/// [`UpdateType::Command`] is never produced by [`UpdateKind::update_type`];
/// the router uses it to label the command route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Command,
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    BusinessConnection,
    BusinessMessage,
    EditedBusinessMessage,
    DeletedBusinessMessages,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
    Unknown,
}

impl UpdateType {
    /// Returns the label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "Command",
            Self::Message => "Message",
            Self::EditedMessage => "EditedMessage",
            Self::ChannelPost => "ChannelPost",
            Self::EditedChannelPost => "EditedChannelPost",
            Self::BusinessConnection => "BusinessConnection",
            Self::BusinessMessage => "BusinessMessage",
            Self::EditedBusinessMessage => "EditedBusinessMessage",
            Self::DeletedBusinessMessages => "DeletedBusinessMessages",
            Self::InlineQuery => "InlineQuery",
            Self::ChosenInlineResult => "ChosenInlineResult",
            Self::CallbackQuery => "CallbackQuery",
            Self::ShippingQuery => "ShippingQuery",
            Self::PreCheckoutQuery => "PreCheckoutQuery",
            Self::Poll => "Poll",
            Self::PollAnswer => "PollAnswer",
            Self::MyChatMember => "MyChatMember",
            Self::ChatMember => "ChatMember",
            Self::ChatJoinRequest => "ChatJoinRequest",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chat, ChatKind, Poll};
    use serde_json::json;

    fn text_message(text: &str) -> Message {
        Message {
            message_id: 1,
            date: 0,
            chat: Chat {
                id: 7,
                kind: ChatKind::Private,
                title: None,
                username: None,
            },
            from: None,
            text: Some(text.to_string()),
            business_connection_id: None,
        }
    }

    #[test]
    fn test_deserialize_message_update() {
        let raw = json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1700000000,
                "chat": {"id": 99, "type": "private"},
                "text": "/start now"
            }
        });

        let update: Update = serde_json::from_value(raw).unwrap();
        assert_eq!(update.update_id, 10);
        assert_eq!(update.update_type(), UpdateType::Message);

        let (message, text) = update.as_command().unwrap();
        assert_eq!(message.chat.id, 99);
        assert_eq!(text, "/start now");
    }

    #[test]
    fn test_deserialize_unknown_kind() {
        let raw = json!({
            "update_id": 11,
            "message_reaction": {"chat": {"id": 1}}
        });

        let update: Update = serde_json::from_value(raw).unwrap();
        assert_eq!(update.update_type(), UpdateType::Unknown);
    }

    #[test]
    fn test_edited_message_is_not_a_command() {
        let update = Update::new(1, UpdateKind::EditedMessage(text_message("/ping")));
        assert!(update.as_command().is_none());
        assert_eq!(update.update_type(), UpdateType::EditedMessage);
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        let update = Update::new(1, UpdateKind::Message(text_message("ping /now")));
        assert!(update.as_command().is_none());
    }

    #[test]
    fn test_update_type_labels() {
        let poll = UpdateKind::Poll(Poll {
            id: "p".into(),
            question: "?".into(),
            options: Vec::new(),
            total_voter_count: 0,
            is_closed: false,
        });
        assert_eq!(poll.update_type().to_string(), "Poll");
        assert_eq!(UpdateType::Command.as_str(), "Command");
    }
}
