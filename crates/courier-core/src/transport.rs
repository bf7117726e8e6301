//! Transport collaborator interfaces.
//!
//! A [`Transport`] opens a [`Session`] that delivers batches of updates to an
//! [`UpdateConsumer`]. Push-style transports call
//! [`consume`](UpdateConsumer::consume) directly; pull-style sources implement
//! [`UpdateSource`] and are adapted by [`PollingTransport`].
//!
//! ```text
//! UpdateSource::fetch_batch ──▶ PollingTransport ──▶ UpdateConsumer::consume
//!                                     │
//!                               Session::close
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{TransportError, TransportResult};
use crate::update::Update;

// =============================================================================
// Traits
// =============================================================================

/// Receives batches of updates from a session.
///
/// Implementations must return quickly: the caller is the transport's own
/// delivery loop.
pub trait UpdateConsumer: Send + Sync {
    /// Accepts one batch of updates.
    fn consume(&self, updates: Vec<Update>);
}

/// A shared [`UpdateConsumer`] trait object.
pub type BoxedConsumer = Arc<dyn UpdateConsumer>;

/// An active transport connection.
#[async_trait]
pub trait Session: Send + Sync {
    /// Stops delivering updates and releases the connection.
    async fn close(&self) -> TransportResult<()>;
}

/// A boxed [`Session`] trait object.
pub type BoxedSession = Box<dyn Session>;

/// Opens sessions that feed updates to a consumer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a session for the bot identified by `token`.
    ///
    /// Updates start flowing to `consumer` once this returns.
    async fn connect(&self, token: &str, consumer: BoxedConsumer) -> TransportResult<BoxedSession>;
}

/// A shared [`Transport`] trait object.
pub type BoxedTransport = Arc<dyn Transport>;

/// A pull-style source of update batches.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Waits for and returns the next batch. An empty batch is allowed.
    async fn fetch_batch(&self) -> TransportResult<Vec<Update>>;
}

// =============================================================================
// PollingTransport
// =============================================================================

/// Adapts a pull-style [`UpdateSource`] into a [`Transport`].
///
/// Each session runs one task that repeatedly fetches a batch and hands it to
/// the consumer. Fetch errors are logged and followed by `error_backoff`
/// before the next attempt.
pub struct PollingTransport<S> {
    source: Arc<S>,
    error_backoff: Duration,
}

impl<S: UpdateSource + 'static> PollingTransport<S> {
    /// Creates a polling transport over `source`.
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            error_backoff: Duration::from_secs(1),
        }
    }

    /// Sets the pause after a failed fetch.
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

#[async_trait]
impl<S: UpdateSource + 'static> Transport for PollingTransport<S> {
    async fn connect(&self, _token: &str, consumer: BoxedConsumer) -> TransportResult<BoxedSession> {
        let cancel = CancellationToken::new();
        let source = Arc::clone(&self.source);
        let backoff = self.error_backoff;
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                let batch = tokio::select! {
                    _ = token.cancelled() => break,
                    batch = source.fetch_batch() => batch,
                };

                match batch {
                    Ok(updates) if updates.is_empty() => {}
                    Ok(updates) => {
                        debug!(count = updates.len(), "Fetched update batch");
                        consumer.consume(updates);
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to fetch updates");
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
            debug!("Polling loop exited");
        });

        info!("Polling session opened");
        Ok(Box::new(PollingSession {
            cancel,
            task: Mutex::new(Some(task)),
        }))
    }
}

struct PollingSession {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Session for PollingSession {
    async fn close(&self) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Polling loop ended abnormally");
        }
        info!("Polling session closed");
        Ok(())
    }
}
