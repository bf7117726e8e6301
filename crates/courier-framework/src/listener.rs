//! General update listeners.
//!
//! A [`Listener`] exposes one async method per [`UpdateKind`]; every method
//! has a no-op default, so implementors only override the kinds they care
//! about. Listeners are kept in a [`ListenerSet`] and invoked in registration
//! order.
//!
//! ```rust,ignore
//! use courier_framework::Listener;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Listener for Echo {
//!     async fn on_message(&self, api: &BoxedApi, message: &Message) -> anyhow::Result<()> {
//!         if let Some(text) = message.text() {
//!             api.send_message(message.chat.id, text).await?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```
//!
//! [`UpdateKind`]: courier_core::UpdateKind

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use courier_core::{
    BoxedApi, BusinessConnection, BusinessMessagesDeleted, CallbackQuery, ChatJoinRequest,
    ChatMemberUpdated, ChosenInlineResult, InlineQuery, Message, Poll, PollAnswer,
    PreCheckoutQuery, ShippingQuery,
};
use parking_lot::RwLock;

/// Result type returned by listener methods.
pub type ListenerResult = anyhow::Result<()>;

/// Receives routed updates, one method per update kind.
///
/// Errors and panics are caught by the router, logged with the listener
/// [`name`](Self::name), and never stop other listeners.
#[async_trait]
#[allow(unused_variables)]
pub trait Listener: Send + Sync {
    /// Name used in diagnostics. Defaults to the Rust type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn on_message(&self, api: &BoxedApi, message: &Message) -> ListenerResult {
        Ok(())
    }

    async fn on_edited_message(&self, api: &BoxedApi, message: &Message) -> ListenerResult {
        Ok(())
    }

    async fn on_channel_post(&self, api: &BoxedApi, post: &Message) -> ListenerResult {
        Ok(())
    }

    async fn on_edited_channel_post(&self, api: &BoxedApi, post: &Message) -> ListenerResult {
        Ok(())
    }

    async fn on_business_connection(
        &self,
        api: &BoxedApi,
        connection: &BusinessConnection,
    ) -> ListenerResult {
        Ok(())
    }

    async fn on_business_message(&self, api: &BoxedApi, message: &Message) -> ListenerResult {
        Ok(())
    }

    async fn on_edited_business_message(
        &self,
        api: &BoxedApi,
        message: &Message,
    ) -> ListenerResult {
        Ok(())
    }

    async fn on_deleted_business_messages(
        &self,
        api: &BoxedApi,
        deleted: &BusinessMessagesDeleted,
    ) -> ListenerResult {
        Ok(())
    }

    async fn on_inline_query(&self, api: &BoxedApi, query: &InlineQuery) -> ListenerResult {
        Ok(())
    }

    async fn on_chosen_inline_result(
        &self,
        api: &BoxedApi,
        result: &ChosenInlineResult,
    ) -> ListenerResult {
        Ok(())
    }

    async fn on_callback_query(&self, api: &BoxedApi, query: &CallbackQuery) -> ListenerResult {
        Ok(())
    }

    async fn on_shipping_query(&self, api: &BoxedApi, query: &ShippingQuery) -> ListenerResult {
        Ok(())
    }

    async fn on_pre_checkout_query(
        &self,
        api: &BoxedApi,
        query: &PreCheckoutQuery,
    ) -> ListenerResult {
        Ok(())
    }

    async fn on_poll(&self, api: &BoxedApi, poll: &Poll) -> ListenerResult {
        Ok(())
    }

    async fn on_poll_answer(&self, api: &BoxedApi, answer: &PollAnswer) -> ListenerResult {
        Ok(())
    }

    /// The bot's own membership status changed in a chat.
    async fn on_my_chat_member(
        &self,
        api: &BoxedApi,
        update: &ChatMemberUpdated,
    ) -> ListenerResult {
        Ok(())
    }

    /// Another member's status changed. Only delivered if the bot is an admin
    /// and explicitly subscribed upstream.
    async fn on_chat_member(&self, api: &BoxedApi, update: &ChatMemberUpdated) -> ListenerResult {
        Ok(())
    }

    async fn on_chat_join_request(
        &self,
        api: &BoxedApi,
        request: &ChatJoinRequest,
    ) -> ListenerResult {
        Ok(())
    }
}

/// A shared [`Listener`] trait object.
pub type BoxedListener = Arc<dyn Listener>;

/// Handle returned by [`ListenerSet::add`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// One registered listener.
#[derive(Clone)]
pub struct ListenerEntry {
    pub id: ListenerId,
    pub listener: BoxedListener,
}

/// Ordered set of listeners with copy-on-write snapshots.
///
/// Adding or removing while updates are being routed is safe: in-flight
/// dispatches keep the snapshot they started with.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    entries: RwLock<Arc<Vec<ListenerEntry>>>,
}

impl ListenerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener and returns its id.
    pub fn add<L: Listener + 'static>(&self, listener: L) -> ListenerId {
        self.add_shared(Arc::new(listener))
    }

    /// Appends an already shared listener and returns its id.
    pub fn add_shared(&self, listener: BoxedListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, listener = listener.name(), "Added listener");
        Arc::make_mut(&mut *self.entries.write()).push(ListenerEntry { id, listener });
        id
    }

    /// Removes the listener registered under `id`.
    pub fn remove(&self, id: ListenerId) -> Option<BoxedListener> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|e| e.id == id)?;
        let entry = Arc::make_mut(&mut *entries).remove(index);
        tracing::debug!(%id, listener = entry.listener.name(), "Removed listener");
        Some(entry.listener)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// A point-in-time view of the listeners, in registration order.
    pub fn snapshot(&self) -> Arc<Vec<ListenerEntry>> {
        Arc::clone(&self.entries.read())
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|e| format!("{}={}", e.id, e.listener.name()))
            .collect();
        f.debug_struct("ListenerSet").field("listeners", &names).finish()
    }
}
