//! The bot lifecycle.
//!
//! A [`Bot`] owns the command registry and listener set, and on
//! [`start`](Bot::start) wires them to a fresh [`Dispatcher`] that the
//! transport feeds with update batches.
//!
//! ```text
//!            start()                         stop()
//! Created ───────────▶ Started ───────────────────────▶ Stopped
//!                         ▲                                │
//!                         └────────── start() ─────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::{Bot, config::load_options};
//!
//! let bot = Bot::new(load_options()?, api, transport)?;
//! bot.add_command(Command::new("ping", "Replies with pong", |ctx| async move {
//!     ctx.reply("pong").await?;
//!     Ok(())
//! }))?;
//! bot.add_listener(MyListener);
//!
//! // Start, wait for Ctrl+C or SIGTERM, stop.
//! bot.run().await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use courier_core::{BoxedApi, BoxedConsumer, BoxedSession, BoxedTransport};
use courier_framework::{
    BoxedListener, Command, CommandRegistry, DispatchHook, Dispatcher, Listener, ListenerId,
    ListenerSet, Router,
};
use parking_lot::RwLock;
use tokio::signal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::config::{BotCreationOptions, validate_options};
use crate::error::{BotError, BotResult};
use crate::logging;
use crate::metadata::{sync_command_menu, sync_metadata};

/// Lifecycle state of a [`Bot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    /// Built but never started.
    Created,
    /// A session is open and updates are dispatched.
    Started,
    /// Stopped after running; may be started again.
    Stopped,
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Started => write!(f, "Started"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Options for [`Bot::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Publish the command menu after connecting.
    pub sync_commands: bool,
    /// Stop the bot when Ctrl+C or SIGTERM arrives.
    pub stop_on_shutdown_signal: bool,
    /// Exit the process with status 1 if starting fails.
    pub exit_on_error: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            sync_commands: true,
            stop_on_shutdown_signal: false,
            exit_on_error: false,
        }
    }
}

impl StartOptions {
    pub fn sync_commands(mut self, enabled: bool) -> Self {
        self.sync_commands = enabled;
        self
    }

    pub fn stop_on_shutdown_signal(mut self, enabled: bool) -> Self {
        self.stop_on_shutdown_signal = enabled;
        self
    }

    pub fn exit_on_error(mut self, enabled: bool) -> Self {
        self.exit_on_error = enabled;
        self
    }
}

/// Resources held while the bot is started.
struct Lifecycle {
    state: BotState,
    dispatcher: Option<Arc<Dispatcher>>,
    session: Option<BoxedSession>,
    signal_watch: Option<CancellationToken>,
}

struct Inner {
    options: BotCreationOptions,
    api: BoxedApi,
    transport: BoxedTransport,
    commands: Arc<CommandRegistry>,
    listeners: Arc<ListenerSet>,
    hook: RwLock<Option<DispatchHook>>,
    lifecycle: Mutex<Lifecycle>,
    span: Span,
}

/// A chat bot: commands, listeners and the session that feeds them.
///
/// Cloning is cheap and every clone controls the same bot.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<Inner>,
}

impl Bot {
    /// Creates a bot after validating `options`.
    ///
    /// Also installs the global log subscriber described by
    /// `options.logging`, unless one is already installed.
    pub fn new(
        options: BotCreationOptions,
        api: BoxedApi,
        transport: BoxedTransport,
    ) -> BotResult<Self> {
        validate_options(&options)?;
        logging::init_from_config(&options.logging);

        let span = info_span!("bot", bot = %options.logger_name);
        span.in_scope(|| debug!(?options, "Bot created"));

        let commands = Arc::new(CommandRegistry::new());
        commands.set_username(options.username.as_deref());

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                api,
                transport,
                commands,
                listeners: Arc::new(ListenerSet::new()),
                hook: RwLock::new(None),
                lifecycle: Mutex::new(Lifecycle {
                    state: BotState::Created,
                    dispatcher: None,
                    session: None,
                    signal_watch: None,
                }),
                span,
            }),
        })
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Adds a listener. It receives updates routed after this call returns.
    pub fn add_listener<L: Listener + 'static>(&self, listener: L) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    /// Adds a listener that is shared with other owners.
    pub fn add_shared_listener(&self, listener: BoxedListener) -> ListenerId {
        self.inner.listeners.add_shared(listener)
    }

    /// Removes a listener by id.
    pub fn remove_listener(&self, id: ListenerId) -> Option<BoxedListener> {
        self.inner.listeners.remove(id)
    }

    /// Registers a command.
    ///
    /// Names that would be rejected by the remote menu are accepted but left
    /// out of the published menu. Commands added while started appear in the
    /// menu on the next start.
    pub fn add_command(&self, command: Command) -> BotResult<()> {
        self.inner.commands.register(command)?;
        Ok(())
    }

    /// Removes a command by name.
    pub fn remove_command(&self, name: &str) -> Option<Command> {
        self.inner.commands.unregister(name)
    }

    /// Sets a hook that runs after every dispatched update.
    ///
    /// Takes effect on the next start.
    pub fn on_dispatch(&self, hook: DispatchHook) {
        *self.inner.hook.write() = Some(hook);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.inner.commands
    }

    pub fn listeners(&self) -> &Arc<ListenerSet> {
        &self.inner.listeners
    }

    pub fn api(&self) -> &BoxedApi {
        &self.inner.api
    }

    pub fn options(&self) -> &BotCreationOptions {
        &self.inner.options
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> BotState {
        self.inner.lifecycle.lock().await.state
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects and begins dispatching updates.
    ///
    /// On failure everything acquired so far is released and the state is
    /// left as it was. Starting a started bot logs a warning and does nothing.
    pub async fn start(&self, start: StartOptions) -> BotResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.state == BotState::Started {
            warn!(parent: &self.inner.span, "Bot is already started");
            return Ok(());
        }

        let dispatcher = self.dispatcher();
        let span = self.inner.span.clone();
        match self.bring_up(&dispatcher, start).instrument(span).await {
            Ok(session) => {
                lifecycle.dispatcher = Some(dispatcher);
                lifecycle.session = Some(session);
                lifecycle.state = BotState::Started;
                if start.stop_on_shutdown_signal {
                    lifecycle.signal_watch = Some(self.watch_shutdown_signal());
                }
                info!(parent: &self.inner.span, "Bot started");
                Ok(())
            }
            Err(e) => {
                drop(lifecycle);
                dispatcher
                    .shutdown()
                    .instrument(self.inner.span.clone())
                    .await;
                error!(parent: &self.inner.span, error = %e, "Failed to start bot");
                if start.exit_on_error {
                    std::process::exit(1);
                }
                Err(e)
            }
        }
    }

    /// Stops intake, clears the command menu, closes the session and drains
    /// scheduled updates.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned. Stopping a bot that is not started logs a warning and does
    /// nothing.
    ///
    /// The bot reports [`BotState::Stopped`] once the session is closed;
    /// the drain happens after that, so [`state`](Self::state) and
    /// [`start`](Self::start) do not wait for it. Called from a command or
    /// listener of this bot, `stop` returns without waiting for the drain.
    pub async fn stop(&self) -> BotResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.state != BotState::Started {
            warn!(parent: &self.inner.span, "Bot is not started");
            return Ok(());
        }

        if let Some(watch) = lifecycle.signal_watch.take() {
            watch.cancel();
        }
        let dispatcher = lifecycle.dispatcher.take();
        let session = lifecycle.session.take();

        let span = self.inner.span.clone();
        let result = self
            .tear_down(dispatcher.as_deref(), session)
            .instrument(span.clone())
            .await;

        lifecycle.state = BotState::Stopped;
        drop(lifecycle);

        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown().instrument(span).await;
        }
        info!(parent: &self.inner.span, "Bot stopped");
        result
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> BotResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Starts, waits for `shutdown` to complete, then stops.
    pub async fn run_until<F>(&self, shutdown: F) -> BotResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start(StartOptions::default()).await?;
        info!(parent: &self.inner.span, "Bot is running");

        shutdown.await;

        self.stop().await
    }

    fn dispatcher(&self) -> Arc<Dispatcher> {
        let inner = &self.inner;

        let mut router = Router::new(
            Arc::clone(&inner.commands),
            Arc::clone(&inner.listeners),
            Arc::clone(&inner.api),
        )
        .run_commands_through_on_message(inner.options.run_commands_through_on_message)
        .log_updates(inner.options.log_updates);
        let hook = inner.hook.read().clone();
        if let Some(hook) = hook {
            router = router.on_dispatch(hook);
        }

        Arc::new(Dispatcher::with_span(
            Arc::new(router),
            inner.options.dispatch.clone(),
            inner.span.clone(),
        ))
    }

    /// Connects and syncs. On failure intake is stopped and the session
    /// closed; the caller drains `dispatcher`.
    async fn bring_up(
        &self,
        dispatcher: &Arc<Dispatcher>,
        start: StartOptions,
    ) -> BotResult<BoxedSession> {
        let inner = &self.inner;

        let consumer: BoxedConsumer = dispatcher.clone();
        let session = match inner.transport.connect(&inner.options.token, consumer).await {
            Ok(session) => session,
            Err(e) => {
                dispatcher.stop_intake();
                return Err(e.into());
            }
        };
        debug!("Session opened");

        if let Err(e) = self.sync(start).await {
            Self::roll_back(dispatcher, session).await;
            return Err(e);
        }

        Ok(session)
    }

    async fn sync(&self, start: StartOptions) -> BotResult<()> {
        let report = sync_metadata(self.inner.api.as_ref(), &self.inner.options).await?;
        debug!(
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            skipped = report.skipped.len(),
            "Bot metadata synchronized"
        );

        if start.sync_commands {
            sync_command_menu(self.inner.api.as_ref(), &self.inner.commands).await?;
        }
        Ok(())
    }

    async fn roll_back(dispatcher: &Dispatcher, session: BoxedSession) {
        dispatcher.stop_intake();
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close session while rolling back start");
        }
    }

    /// Everything `stop` does before the drain.
    async fn tear_down(
        &self,
        dispatcher: Option<&Dispatcher>,
        session: Option<BoxedSession>,
    ) -> BotResult<()> {
        let mut first_error: Option<BotError> = None;

        if let Some(dispatcher) = dispatcher {
            dispatcher.stop_intake();
        }

        if let Err(e) = self.inner.api.delete_my_commands().await {
            error!(error = %e, "Failed to clear command menu");
            first_error.get_or_insert(BotError::api("deleteMyCommands", e));
        }

        if let Some(session) = session
            && let Err(e) = session.close().await
        {
            error!(error = %e, "Failed to close session");
            first_error.get_or_insert(e.into());
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn watch_shutdown_signal(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let bot = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = shutdown_signal() => {
                    if let Err(e) = bot.stop().await {
                        error!(error = %e, "Failed to stop bot on shutdown signal");
                    }
                }
            }
        });
        token
    }
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("options", &self.inner.options)
            .field("commands", &self.inner.commands.len())
            .field("listeners", &self.inner.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Completes on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
