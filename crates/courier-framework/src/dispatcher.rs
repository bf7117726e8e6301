//! The consumer loop that turns update batches into routed dispatch units.
//!
//! A [`Dispatcher`] is handed to the transport as its [`UpdateConsumer`].
//! Every update of an incoming batch becomes one dispatch unit that runs
//! [`Router::route`] on the Tokio runtime. `consume` itself never waits for
//! handlers, so a slow listener cannot hold up batch delivery.
//!
//! # Scheduling
//!
//! | [`ConcurrencyPolicy`] | Behavior |
//! |---|---|
//! | `Pooled` | one task per update, optionally bounded by `max_in_flight` |
//! | `Sequential` | one worker task routes updates in arrival order |
//!
//! [`Dispatcher::shutdown`] stops intake and then either waits for the
//! scheduled units or abandons them, depending on
//! [`DispatchConfig::drain_on_stop`]. A shutdown requested from inside one
//! of the dispatcher's own units never waits, since that unit would be
//! waiting on itself.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use courier_core::{Update, UpdateConsumer};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, debug, debug_span, info, warn};

use crate::router::Router;

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(0);

tokio::task_local! {
    /// Id of the dispatcher whose unit is running on the current task.
    static CURRENT_DISPATCHER: u64;
}

// ============================================================================
// Configuration
// ============================================================================

/// How dispatch units are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// One task per update; no ordering across updates.
    #[default]
    Pooled,
    /// A single worker routes updates strictly in arrival order.
    Sequential,
}

/// Dispatch loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Scheduling policy.
    pub policy: ConcurrencyPolicy,
    /// Upper bound on concurrently running units under the pooled policy.
    ///
    /// `None` means unbounded.
    pub max_in_flight: Option<usize>,
    /// Wait for scheduled units on shutdown instead of abandoning them.
    pub drain_on_stop: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            policy: ConcurrencyPolicy::Pooled,
            max_in_flight: None,
            drain_on_stop: true,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Schedules one routed dispatch unit per incoming update.
///
/// Must be created inside a Tokio runtime: the sequential policy spawns its
/// worker immediately.
pub struct Dispatcher {
    id: u64,
    router: Arc<Router>,
    config: DispatchConfig,
    tracker: TaskTracker,
    /// Cancelled once intake stops.
    intake: CancellationToken,
    /// Cancelled when scheduled units are abandoned.
    abandon: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
    /// Also serializes scheduling against [`Dispatcher::stop_intake`].
    queue: Mutex<Option<mpsc::UnboundedSender<Update>>>,
    span: Span,
}

impl Dispatcher {
    /// Creates a dispatcher whose units run inside the current span.
    pub fn new(router: Arc<Router>, config: DispatchConfig) -> Self {
        Self::with_span(router, config, Span::current())
    }

    /// Creates a dispatcher whose units run inside `span`.
    ///
    /// A `max_in_flight` outside `1..=Semaphore::MAX_PERMITS` is clamped into
    /// that range.
    pub fn with_span(router: Arc<Router>, config: DispatchConfig, span: Span) -> Self {
        let id = NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed);
        let tracker = TaskTracker::new();
        let abandon = CancellationToken::new();

        let limiter = match (config.policy, config.max_in_flight) {
            (ConcurrencyPolicy::Pooled, Some(limit)) => {
                let permits = limit.clamp(1, Semaphore::MAX_PERMITS);
                if permits != limit {
                    warn!(requested = limit, permits, "max_in_flight out of range, clamped");
                }
                Some(Arc::new(Semaphore::new(permits)))
            }
            _ => None,
        };

        let queue = match config.policy {
            ConcurrencyPolicy::Sequential => {
                let (tx, rx) = mpsc::unbounded_channel();
                tracker.spawn(CURRENT_DISPATCHER.scope(
                    id,
                    sequential_worker(Arc::clone(&router), rx, abandon.clone())
                        .instrument(span.clone()),
                ));
                Some(tx)
            }
            ConcurrencyPolicy::Pooled => None,
        };

        debug!(policy = ?config.policy, max_in_flight = ?config.max_in_flight, "Dispatcher created");

        Self {
            id,
            router,
            config,
            tracker,
            intake: CancellationToken::new(),
            abandon,
            limiter,
            queue: Mutex::new(queue),
            span,
        }
    }

    /// The configuration this dispatcher was built with.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Whether batches are still accepted.
    pub fn is_accepting(&self) -> bool {
        !self.intake.is_cancelled()
    }

    /// Number of scheduled units that have not finished yet.
    ///
    /// Under the sequential policy the worker itself counts as one.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting batches without waiting for scheduled units.
    ///
    /// Once this returns no further unit is scheduled, even for a batch whose
    /// `consume` call was already under way. Idempotent.
    pub fn stop_intake(&self) {
        let mut queue = self.queue.lock();
        if self.intake.is_cancelled() {
            return;
        }
        self.intake.cancel();
        // Dropping the sender lets the sequential worker finish its backlog.
        queue.take();
        self.tracker.close();
        debug!("Dispatcher intake stopped");
    }

    /// Whether the current task is running one of this dispatcher's units.
    pub fn is_current(&self) -> bool {
        CURRENT_DISPATCHER
            .try_with(|id| *id == self.id)
            .unwrap_or(false)
    }

    /// Stops intake, then drains or abandons scheduled units.
    ///
    /// Safe to call again; a repeated drain waits for whatever is left.
    /// Called from inside one of this dispatcher's units it only stops
    /// intake, and the remaining units finish on their own.
    pub async fn shutdown(&self) {
        self.stop_intake();

        if self.is_current() {
            warn!(
                pending = self.tracker.len(),
                "Shutdown requested from a dispatch unit, not waiting for drain"
            );
            if !self.config.drain_on_stop {
                self.abandon.cancel();
            }
            return;
        }

        if self.config.drain_on_stop {
            info!(pending = self.tracker.len(), "Draining dispatch units");
            self.tracker.wait().await;
            info!("Dispatcher drained");
        } else {
            self.abandon.cancel();
            info!(pending = self.tracker.len(), "Abandoning dispatch units");
        }
    }

    fn schedule(&self, update: Update) {
        // Held until the unit is queued or spawned; `stop_intake` takes it too.
        let queue = self.queue.lock();
        if self.intake.is_cancelled() {
            debug!(update_id = update.update_id, "Intake stopped mid-batch, dropping update");
            return;
        }

        let span = debug_span!(parent: &self.span, "update", update_id = update.update_id);

        if let Some(queue) = queue.as_ref() {
            if let Err(rejected) = queue.send(update) {
                warn!(update_id = rejected.0.update_id, "Sequential worker gone, dropping update");
            }
            return;
        }

        let router = Arc::clone(&self.router);
        let limiter = self.limiter.clone();
        let abandon = self.abandon.clone();
        self.tracker.spawn(CURRENT_DISPATCHER.scope(
            self.id,
            async move {
                let _permit = match limiter {
                    Some(limiter) => tokio::select! {
                        _ = abandon.cancelled() => return,
                        permit = limiter.acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            Err(_) => return,
                        },
                    },
                    None => None,
                };
                route_one(&router, update).await;
            }
            .instrument(span),
        ));
    }
}

impl UpdateConsumer for Dispatcher {
    /// Schedules every update of `updates`.
    ///
    /// A batch that arrives after intake stopped is dropped whole. If intake
    /// stops while a batch is being scheduled, the updates not yet scheduled
    /// are dropped.
    fn consume(&self, updates: Vec<Update>) {
        if !self.is_accepting() {
            warn!(count = updates.len(), "Dispatcher is stopped, dropping update batch");
            return;
        }
        debug!(count = updates.len(), "Scheduling update batch");
        for update in updates {
            self.schedule(update);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("accepting", &self.is_accepting())
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

async fn route_one(router: &Router, update: Update) {
    let report = router.route(&update).await;
    debug!(
        kind = %report.kind,
        command = report.command.as_deref(),
        delivered = report.delivered,
        failed = report.failed,
        "Update routed"
    );
}

async fn sequential_worker(
    router: Arc<Router>,
    mut rx: mpsc::UnboundedReceiver<Update>,
    abandon: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            biased;
            _ = abandon.cancelled() => break,
            next = rx.recv() => match next {
                Some(update) => update,
                None => break,
            },
        };
        let span = debug_span!("update", update_id = update.update_id);
        tokio::select! {
            biased;
            _ = abandon.cancelled() => break,
            _ = route_one(&router, update).instrument(span) => {}
        }
    }
    debug!("Sequential worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandRegistry;
    use crate::listener::{Listener, ListenerResult, ListenerSet};
    use async_trait::async_trait;
    use courier_core::{
        ApiError, ApiResult, BotApi, BotCommand, BoxedApi, Chat, ChatKind, Message, UpdateKind,
    };
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

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

    /// Counts `on_message` calls per message id, with an optional delay.
    #[derive(Default)]
    struct Tally {
        seen: Mutex<HashMap<i64, usize>>,
        order: Mutex<Vec<i64>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Listener for Arc<Tally> {
        async fn on_message(&self, _api: &BoxedApi, message: &Message) -> ListenerResult {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            *self.seen.lock().entry(message.message_id).or_default() += 1;
            self.order.lock().push(message.message_id);
            Ok(())
        }
    }

    fn message(id: i64) -> Update {
        Update::new(
            id,
            UpdateKind::Message(Message {
                message_id: id,
                date: 0,
                chat: Chat {
                    id: 1,
                    kind: ChatKind::Group,
                    title: None,
                    username: None,
                },
                from: None,
                text: Some(format!("msg {id}")),
                business_connection_id: None,
            }),
        )
    }

    fn dispatcher(tallies: &[Arc<Tally>], config: DispatchConfig) -> Dispatcher {
        let listeners = Arc::new(ListenerSet::new());
        for tally in tallies {
            listeners.add(Arc::clone(tally));
        }
        let router = Router::new(
            Arc::new(CommandRegistry::new()),
            listeners,
            Arc::new(NullApi),
        );
        Dispatcher::new(Arc::new(router), config)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pooled_routes_every_update_exactly_once() {
        let tallies = [Arc::new(Tally::default()), Arc::new(Tally::default())];
        let dispatcher = dispatcher(&tallies, DispatchConfig::default());

        for chunk in (0..200).collect::<Vec<i64>>().chunks(25) {
            dispatcher.consume(chunk.iter().copied().map(message).collect());
        }
        dispatcher.shutdown().await;

        for tally in &tallies {
            let seen = tally.seen.lock();
            assert_eq!(seen.len(), 200);
            assert!(seen.values().all(|&n| n == 1));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pooled_respects_max_in_flight() {
        let tally = Arc::new(Tally {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let dispatcher = dispatcher(
            std::slice::from_ref(&tally),
            DispatchConfig {
                max_in_flight: Some(2),
                ..Default::default()
            },
        );

        dispatcher.consume((0..6).map(message).collect());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(tally.order.lock().len() <= 4);

        dispatcher.shutdown().await;
        assert_eq!(tally.order.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_sequential_preserves_arrival_order() {
        let tally = Arc::new(Tally {
            delay: Some(Duration::from_millis(1)),
            ..Default::default()
        });
        let dispatcher = dispatcher(
            std::slice::from_ref(&tally),
            DispatchConfig {
                policy: ConcurrencyPolicy::Sequential,
                ..Default::default()
            },
        );

        dispatcher.consume((0..10).map(message).collect());
        dispatcher.consume((10..20).map(message).collect());
        dispatcher.shutdown().await;

        assert_eq!(*tally.order.lock(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_batches_after_shutdown_are_dropped() {
        let tally = Arc::new(Tally::default());
        let dispatcher = dispatcher(std::slice::from_ref(&tally), DispatchConfig::default());

        dispatcher.shutdown().await;
        assert!(!dispatcher.is_accepting());

        dispatcher.consume(vec![message(1)]);
        tokio::task::yield_now().await;
        assert!(tally.order.lock().is_empty());

        // Second shutdown is a no-op.
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_intake_keeps_scheduled_units() {
        let tally = Arc::new(Tally {
            delay: Some(Duration::from_millis(5)),
            ..Default::default()
        });
        let dispatcher = dispatcher(std::slice::from_ref(&tally), DispatchConfig::default());

        dispatcher.consume((0..3).map(message).collect());
        dispatcher.stop_intake();
        dispatcher.stop_intake();
        dispatcher.consume(vec![message(99)]);

        dispatcher.shutdown().await;
        let mut order = tally.order.lock().clone();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_abandon_without_drain() {
        let tally = Arc::new(Tally {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let dispatcher = dispatcher(
            std::slice::from_ref(&tally),
            DispatchConfig {
                policy: ConcurrencyPolicy::Sequential,
                drain_on_stop: false,
                ..Default::default()
            },
        );

        dispatcher.consume((0..3).map(message).collect());
        tokio::time::timeout(Duration::from_secs(1), dispatcher.shutdown())
            .await
            .expect("shutdown should not wait for abandoned units");

        tokio::time::timeout(Duration::from_secs(1), dispatcher.tracker.wait())
            .await
            .expect("sequential worker should stop when abandoned");
        assert!(tally.order.lock().is_empty());
    }

    /// Shuts its own dispatcher down from inside `on_message`.
    #[derive(Default)]
    struct Stopper {
        target: OnceLock<Weak<Dispatcher>>,
        returned: AtomicBool,
    }

    #[async_trait]
    impl Listener for Arc<Stopper> {
        async fn on_message(&self, _api: &BoxedApi, _message: &Message) -> ListenerResult {
            if let Some(dispatcher) = self.target.get().and_then(Weak::upgrade) {
                dispatcher.shutdown().await;
            }
            self.returned.store(true, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_from_own_unit_does_not_wait() {
        for policy in [ConcurrencyPolicy::Pooled, ConcurrencyPolicy::Sequential] {
            let stopper = Arc::new(Stopper::default());
            let listeners = Arc::new(ListenerSet::new());
            listeners.add(Arc::clone(&stopper));
            let router = Router::new(
                Arc::new(CommandRegistry::new()),
                listeners,
                Arc::new(NullApi),
            );
            let dispatcher = Arc::new(Dispatcher::new(
                Arc::new(router),
                DispatchConfig {
                    policy,
                    ..Default::default()
                },
            ));
            stopper.target.set(Arc::downgrade(&dispatcher)).unwrap();
            assert!(!dispatcher.is_current());

            dispatcher.consume(vec![message(1)]);

            tokio::time::timeout(Duration::from_secs(1), dispatcher.tracker.wait())
                .await
                .expect("unit that shut down its dispatcher should still finish");
            assert!(stopper.returned.load(AtomicOrdering::SeqCst));
            assert!(!dispatcher.is_accepting());

            tokio::time::timeout(Duration::from_secs(1), dispatcher.shutdown())
                .await
                .expect("outer shutdown should complete");
        }
    }

    #[tokio::test]
    async fn test_out_of_range_max_in_flight_is_clamped() {
        for limit in [0, usize::MAX] {
            let tally = Arc::new(Tally::default());
            let dispatcher = dispatcher(
                std::slice::from_ref(&tally),
                DispatchConfig {
                    max_in_flight: Some(limit),
                    ..Default::default()
                },
            );

            dispatcher.consume((0..3).map(message).collect());
            tokio::time::timeout(Duration::from_secs(1), dispatcher.shutdown())
                .await
                .expect("clamped limiter should let units run");
            assert_eq!(tally.order.lock().len(), 3);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nothing_runs_after_shutdown_returns() {
        let tally = Arc::new(Tally::default());
        let dispatcher = Arc::new(dispatcher(
            std::slice::from_ref(&tally),
            DispatchConfig::default(),
        ));

        let feeder = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                let mut next = 0;
                while next < 100_000 {
                    dispatcher.consume((next..next + 50).map(message).collect());
                    next += 50;
                    tokio::task::yield_now().await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        dispatcher.shutdown().await;
        let routed = tally.order.lock().len();

        feeder.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tally.order.lock().len(), routed);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn test_dispatch_config_deserialize() {
        let config: DispatchConfig =
            serde_json::from_value(serde_json::json!({"policy": "sequential"})).unwrap();
        assert_eq!(config.policy, ConcurrencyPolicy::Sequential);
        assert!(config.drain_on_stop);
        assert_eq!(config.max_in_flight, None);
    }
}
