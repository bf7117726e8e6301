//! Per-update routing.
//!
//! The [`Router`] takes one [`Update`] and runs every handler it should reach,
//! awaiting them one after another:
//!
//! ```text
//!                 ┌─ "/cmd ..." and registered ─▶ command handler ─┐
//! Update ─────────┤                                                ├─▶ listeners (in order)
//!                 └─ anything else ───────────────────────────────┘      (skipped after a command
//!                                                                          unless run-through is on)
//! ```
//!
//! Every handler runs inside a panic guard. A failing handler is logged and
//! counted; the next one still runs.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use courier_core::{BoxedApi, Update, UpdateKind, UpdateType};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error, info, trace};

use crate::command::{CommandContext, CommandRegistry, parse_invocation};
use crate::listener::{Listener, ListenerResult, ListenerSet};

/// Called after every handler invocation.
///
/// Receives the update, the label of the route taken and the listener that
/// ran, or `None` for the command route.
pub type DispatchHook = Arc<dyn Fn(&Update, UpdateType, Option<&dyn Listener>) + Send + Sync>;

/// Summary of one [`Router::route`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReport {
    /// [`UpdateType::Command`] if a command matched, otherwise the update kind.
    pub kind: UpdateType,
    /// Name of the command that ran, if any.
    pub command: Option<String>,
    /// Handler invocations that completed, successfully or not.
    pub delivered: usize,
    /// Invocations that returned an error or panicked.
    pub failed: usize,
}

/// Maps an update kind to the listener method that handles it.
///
/// Returns `None` for [`UpdateKind::Unknown`].
pub fn deliver<'a>(
    listener: &'a dyn Listener,
    api: &'a BoxedApi,
    kind: &'a UpdateKind,
) -> Option<(UpdateType, BoxFuture<'a, ListenerResult>)> {
    let routed = match kind {
        UpdateKind::Message(m) => (UpdateType::Message, listener.on_message(api, m)),
        UpdateKind::EditedMessage(m) => {
            (UpdateType::EditedMessage, listener.on_edited_message(api, m))
        }
        UpdateKind::ChannelPost(m) => (UpdateType::ChannelPost, listener.on_channel_post(api, m)),
        UpdateKind::EditedChannelPost(m) => (
            UpdateType::EditedChannelPost,
            listener.on_edited_channel_post(api, m),
        ),
        UpdateKind::BusinessConnection(c) => (
            UpdateType::BusinessConnection,
            listener.on_business_connection(api, c),
        ),
        UpdateKind::BusinessMessage(m) => (
            UpdateType::BusinessMessage,
            listener.on_business_message(api, m),
        ),
        UpdateKind::EditedBusinessMessage(m) => (
            UpdateType::EditedBusinessMessage,
            listener.on_edited_business_message(api, m),
        ),
        UpdateKind::DeletedBusinessMessages(d) => (
            UpdateType::DeletedBusinessMessages,
            listener.on_deleted_business_messages(api, d),
        ),
        UpdateKind::InlineQuery(q) => (UpdateType::InlineQuery, listener.on_inline_query(api, q)),
        UpdateKind::ChosenInlineResult(r) => (
            UpdateType::ChosenInlineResult,
            listener.on_chosen_inline_result(api, r),
        ),
        UpdateKind::CallbackQuery(q) => (
            UpdateType::CallbackQuery,
            listener.on_callback_query(api, q),
        ),
        UpdateKind::ShippingQuery(q) => (
            UpdateType::ShippingQuery,
            listener.on_shipping_query(api, q),
        ),
        UpdateKind::PreCheckoutQuery(q) => (
            UpdateType::PreCheckoutQuery,
            listener.on_pre_checkout_query(api, q),
        ),
        UpdateKind::Poll(p) => (UpdateType::Poll, listener.on_poll(api, p)),
        UpdateKind::PollAnswer(a) => (UpdateType::PollAnswer, listener.on_poll_answer(api, a)),
        UpdateKind::MyChatMember(u) => (
            UpdateType::MyChatMember,
            listener.on_my_chat_member(api, u),
        ),
        UpdateKind::ChatMember(u) => (UpdateType::ChatMember, listener.on_chat_member(api, u)),
        UpdateKind::ChatJoinRequest(r) => (
            UpdateType::ChatJoinRequest,
            listener.on_chat_join_request(api, r),
        ),
        UpdateKind::Unknown(_) => return None,
    };
    Some(routed)
}

/// Routes single updates to the command registry and the listener set.
pub struct Router {
    commands: Arc<CommandRegistry>,
    listeners: Arc<ListenerSet>,
    api: BoxedApi,
    run_commands_through_on_message: bool,
    log_updates: bool,
    hook: Option<DispatchHook>,
}

impl Router {
    /// Creates a router over shared registries.
    pub fn new(commands: Arc<CommandRegistry>, listeners: Arc<ListenerSet>, api: BoxedApi) -> Self {
        Self {
            commands,
            listeners,
            api,
            run_commands_through_on_message: false,
            log_updates: false,
            hook: None,
        }
    }

    /// Also deliver matched commands to listeners' `on_message`.
    pub fn run_commands_through_on_message(mut self, enabled: bool) -> Self {
        self.run_commands_through_on_message = enabled;
        self
    }

    /// Emit an `info` record per handler invocation.
    pub fn log_updates(mut self, enabled: bool) -> Self {
        self.log_updates = enabled;
        self
    }

    /// Installs a post-dispatch hook.
    pub fn on_dispatch(mut self, hook: DispatchHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Routes one update and waits for every handler it reaches.
    pub async fn route(&self, update: &Update) -> RouteReport {
        let mut report = RouteReport {
            kind: update.update_type(),
            command: None,
            delivered: 0,
            failed: 0,
        };

        if let Some((message, text)) = update.as_command() {
            let matched = parse_invocation(text)
                .and_then(|inv| self.commands.lookup(inv.token).map(|cmd| (cmd, inv.args())));

            if let Some((command, args)) = matched {
                report.kind = UpdateType::Command;
                report.command = Some(command.name().to_string());

                let ctx = CommandContext::new(
                    update.update_id,
                    message.clone(),
                    command.name(),
                    args,
                    Arc::clone(&self.api),
                );
                debug!(update_id = update.update_id, command = command.name(), "Invoking command");

                let label = format!("/{}", command.name());
                self.run_guarded(update, &label, command.invoke(ctx), &mut report)
                    .await;
                self.after_dispatch(update, UpdateType::Command, None);

                if !self.run_commands_through_on_message {
                    return report;
                }
            } else {
                trace!(update_id = update.update_id, "No command matched, routing as message");
            }
        }

        if matches!(update.kind, UpdateKind::Unknown(_)) {
            trace!(update_id = update.update_id, "Dropping update of unknown kind");
            return report;
        }

        let listeners = self.listeners.snapshot();
        for entry in listeners.iter() {
            let listener = entry.listener.as_ref();
            let Some((kind, fut)) = deliver(listener, &self.api, &update.kind) else {
                break;
            };
            self.run_guarded(update, listener.name(), fut, &mut report)
                .await;
            self.after_dispatch(update, kind, Some(listener));
        }

        report
    }

    async fn run_guarded<F>(&self, update: &Update, handler: &str, fut: F, report: &mut RouteReport)
    where
        F: Future<Output = ListenerResult>,
    {
        report.delivered += 1;
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                report.failed += 1;
                error!(
                    update_id = update.update_id,
                    listener = handler,
                    error = %format!("{e:#}"),
                    "Handler failed"
                );
            }
            Err(panic) => {
                report.failed += 1;
                error!(
                    update_id = update.update_id,
                    listener = handler,
                    panic = panic_message(panic.as_ref()),
                    "Handler panicked"
                );
            }
        }
    }

    fn after_dispatch(&self, update: &Update, kind: UpdateType, listener: Option<&dyn Listener>) {
        if self.log_updates {
            info!("{} - {}", update.update_id, kind);
        }
        if let Some(hook) = &self.hook {
            hook(update, kind, listener);
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("commands", &self.commands.len())
            .field("listeners", &self.listeners.len())
            .field(
                "run_commands_through_on_message",
                &self.run_commands_through_on_message,
            )
            .field("log_updates", &self.log_updates)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use async_trait::async_trait;
    use courier_core::{
        ApiError, ApiResult, BotApi, BotCommand, CallbackQuery, Chat, ChatKind, Message, User,
    };
    use parking_lot::Mutex;
    use serde_json::Value;

    struct NullApi;

    #[async_trait]
    impl BotApi for NullApi {
        async fn call(&self, method: &str, _params: Value) -> ApiResult<Value> {
            Err(ApiError::Other(format!("{method} not supported")))
        }
        async fn set_my_commands(&self, _commands: &[BotCommand]) -> ApiResult<()> {
            Ok(())
        }
        async fn delete_my_commands(&self) -> ApiResult<()> {
            Ok(())
        }
        async fn get_my_name(&self) -> ApiResult<String> {
            Ok(String::new())
        }
        async fn set_my_name(&self, _name: &str) -> ApiResult<()> {
            Ok(())
        }
        async fn get_my_description(&self) -> ApiResult<String> {
            Ok(String::new())
        }
        async fn set_my_description(&self, _description: &str) -> ApiResult<()> {
            Ok(())
        }
        async fn get_my_short_description(&self) -> ApiResult<String> {
            Ok(String::new())
        }
        async fn set_my_short_description(&self, _short: &str) -> ApiResult<()> {
            Ok(())
        }
    }

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        journal: Journal,
    }

    #[async_trait]
    impl Listener for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_message(&self, _api: &BoxedApi, message: &Message) -> ListenerResult {
            self.journal
                .lock()
                .push(format!("{}:{}", self.name, message.text().unwrap_or_default()));
            Ok(())
        }

        async fn on_callback_query(&self, _api: &BoxedApi, _q: &CallbackQuery) -> ListenerResult {
            self.journal.lock().push(format!("{}:callback", self.name));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Listener for Failing {
        async fn on_message(&self, _api: &BoxedApi, _message: &Message) -> ListenerResult {
            anyhow::bail!("boom")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Listener for Panicking {
        async fn on_message(&self, _api: &BoxedApi, _message: &Message) -> ListenerResult {
            panic!("listener exploded")
        }
    }

    fn message_update(id: i64, text: &str) -> Update {
        Update::new(
            id,
            UpdateKind::Message(Message {
                message_id: id,
                date: 0,
                chat: Chat {
                    id: 1,
                    kind: ChatKind::Private,
                    title: None,
                    username: None,
                },
                from: None,
                text: Some(text.to_string()),
                business_connection_id: None,
            }),
        )
    }

    fn fixture(journal: &Journal) -> (Arc<CommandRegistry>, Arc<ListenerSet>) {
        let commands = Arc::new(CommandRegistry::new());
        let j = Arc::clone(journal);
        commands
            .register(Command::new("ping", "Ping", move |ctx| {
                let j = Arc::clone(&j);
                async move {
                    j.lock().push(format!("cmd:{}:{}", ctx.command(), ctx.args().join(",")));
                    Ok::<_, anyhow::Error>(())
                }
            }))
            .unwrap();

        let listeners = Arc::new(ListenerSet::new());
        for name in ["l1", "l2", "l3"] {
            listeners.add(Recorder {
                name,
                journal: Arc::clone(journal),
            });
        }
        (commands, listeners)
    }

    fn router(commands: Arc<CommandRegistry>, listeners: Arc<ListenerSet>) -> Router {
        Router::new(commands, listeners, Arc::new(NullApi))
    }

    #[tokio::test]
    async fn test_command_stops_before_listeners() {
        let journal = Journal::default();
        let (commands, listeners) = fixture(&journal);
        let router = router(commands, listeners);

        let report = router.route(&message_update(1, "/ping a 'b c'")).await;

        assert_eq!(*journal.lock(), vec!["cmd:ping:a,b c"]);
        assert_eq!(report.kind, UpdateType::Command);
        assert_eq!(report.command.as_deref(), Some("ping"));
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_command_runs_through_on_message() {
        let journal = Journal::default();
        let (commands, listeners) = fixture(&journal);
        let router = router(commands, listeners).run_commands_through_on_message(true);

        let report = router.route(&message_update(1, "/ping")).await;

        assert_eq!(
            *journal.lock(),
            vec!["cmd:ping:", "l1:/ping", "l2:/ping", "l3:/ping"]
        );
        assert_eq!(report.delivered, 4);
    }

    #[tokio::test]
    async fn test_unknown_command_falls_through() {
        let journal = Journal::default();
        let (commands, listeners) = fixture(&journal);
        let router = router(commands, listeners);

        let report = router.route(&message_update(1, "/nope")).await;

        assert_eq!(*journal.lock(), vec!["l1:/nope", "l2:/nope", "l3:/nope"]);
        assert_eq!(report.kind, UpdateType::Message);
        assert!(report.command.is_none());
    }

    #[tokio::test]
    async fn test_command_for_other_bot_routes_as_message() {
        let journal = Journal::default();
        let (commands, listeners) = fixture(&journal);
        commands.set_username(Some("courier_bot"));
        let router = router(commands, listeners);

        let report = router.route(&message_update(1, "/ping@some_other_bot")).await;
        assert_eq!(
            *journal.lock(),
            vec![
                "l1:/ping@some_other_bot",
                "l2:/ping@some_other_bot",
                "l3:/ping@some_other_bot"
            ]
        );
        assert!(report.command.is_none());

        journal.lock().clear();
        let report = router.route(&message_update(2, "/ping@Courier_Bot x")).await;
        assert_eq!(*journal.lock(), vec!["cmd:ping:x"]);
        assert_eq!(report.command.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn test_listener_order_for_other_kinds() {
        let journal = Journal::default();
        let (commands, listeners) = fixture(&journal);
        let router = router(commands, listeners);

        let update = Update::new(
            2,
            UpdateKind::CallbackQuery(CallbackQuery {
                id: "q".into(),
                from: User {
                    id: 5,
                    is_bot: false,
                    first_name: "Ann".into(),
                    last_name: None,
                    username: None,
                    language_code: None,
                },
                message: None,
                inline_message_id: None,
                data: Some("x".into()),
            }),
        );
        router.route(&update).await;

        assert_eq!(
            *journal.lock(),
            vec!["l1:callback", "l2:callback", "l3:callback"]
        );
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let journal = Journal::default();
        let commands = Arc::new(CommandRegistry::new());
        let listeners = Arc::new(ListenerSet::new());
        listeners.add(Failing);
        listeners.add(Panicking);
        listeners.add(Recorder {
            name: "after",
            journal: Arc::clone(&journal),
        });
        let router = router(commands, listeners);

        let report = router.route(&message_update(3, "hi")).await;

        assert_eq!(*journal.lock(), vec!["after:hi"]);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 2);
    }

    #[tokio::test]
    async fn test_failing_command_still_runs_through() {
        let journal = Journal::default();
        let (_, listeners) = fixture(&journal);
        let commands = Arc::new(CommandRegistry::new());
        commands
            .register(Command::new("fail", "Fails", |_| async {
                Err::<(), _>(anyhow::anyhow!("command failed"))
            }))
            .unwrap();
        commands
            .register(Command::new("explode", "Panics", |ctx| async move {
                if ctx.command() == "explode" {
                    panic!("command exploded");
                }
                Ok::<_, anyhow::Error>(())
            }))
            .unwrap();

        let hooks: Arc<Mutex<Vec<(UpdateType, Option<String>)>>> = Arc::default();
        let sink = Arc::clone(&hooks);
        let router = router(commands, listeners)
            .run_commands_through_on_message(true)
            .on_dispatch(Arc::new(
                move |_update: &Update, kind: UpdateType, listener: Option<&dyn Listener>| {
                    sink.lock()
                        .push((kind, listener.map(|l| l.name().to_string())));
                },
            ));

        for (id, text) in [(6, "/fail"), (7, "/explode")] {
            journal.lock().clear();
            hooks.lock().clear();

            let report = router.route(&message_update(id, text)).await;

            assert_eq!(report.kind, UpdateType::Command);
            assert_eq!(report.delivered, 4);
            assert_eq!(report.failed, 1);
            assert_eq!(
                *journal.lock(),
                vec![format!("l1:{text}"), format!("l2:{text}"), format!("l3:{text}")]
            );
            let hooks = hooks.lock();
            assert_eq!(hooks.len(), 4);
            assert_eq!(hooks[0], (UpdateType::Command, None));
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_dropped() {
        let journal = Journal::default();
        let (commands, listeners) = fixture(&journal);
        let router = router(commands, listeners);

        let update = Update::new(4, UpdateKind::Unknown(Value::Null));
        let report = router.route(&update).await;

        assert!(journal.lock().is_empty());
        assert_eq!(report.kind, UpdateType::Unknown);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_hook_fires_once_per_invocation() {
        let journal = Journal::default();
        let (commands, listeners) = fixture(&journal);
        let seen: Arc<Mutex<Vec<(UpdateType, Option<String>)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let router = router(commands, listeners)
            .run_commands_through_on_message(true)
            .log_updates(true)
            .on_dispatch(Arc::new(
                move |_update: &Update, kind: UpdateType, listener: Option<&dyn Listener>| {
                    sink.lock()
                        .push((kind, listener.map(|l| l.name().to_string())));
                },
            ));

        router.route(&message_update(5, "/ping")).await;

        assert_eq!(
            *seen.lock(),
            vec![
                (UpdateType::Command, None),
                (UpdateType::Message, Some("l1".into())),
                (UpdateType::Message, Some("l2".into())),
                (UpdateType::Message, Some("l3".into())),
            ]
        );
    }
}
