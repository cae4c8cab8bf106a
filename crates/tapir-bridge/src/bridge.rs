//! The consumption loop.
//!
//! Each delivery moves through
//! `RECEIVED → DECODED → DISPATCHED → {COMMITTED | DROPPED | RETRY | FATAL}`:
//!
//! | Disposition | Store       | Settlement           |
//! |-------------|-------------|----------------------|
//! | Committed   | commit      | ack                  |
//! | Dropped     | rollback    | ack                  |
//! | Retry       | rollback    | nack after backoff   |
//! | Fatal       | rollback    | nack, error logged   |
//!
//! Retrying is left entirely to redelivery; a handler is never re-invoked
//! in-process. A panicking handler is fatal and always stops the bridge.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::field::Empty;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BridgeConfig;
use crate::envelope::IdentityEvent;
use crate::error::BridgeError;
use crate::forwarder::{ForwardOutcome, Forwarder};
use crate::handler::{ChangeSet, FailureKind, HandlerContext, Outcome, SkipReason};
use crate::health::{BridgeHealth, BridgeStats};
use crate::locks::SubjectLocks;
use crate::registry::HandlerRegistry;
use crate::source::{Delivery, MessageSource};
use crate::store::{LegacyStore, LegacyTx};

/// Why a message was acknowledged without a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Body or representation is not usable.
    InvalidEnvelope(String),
    /// Event belongs to another realm.
    RealmMismatch(Option<String>),
    /// No handler for the dispatch key.
    Unregistered(String),
    /// Referenced identity is absent from the legacy store.
    NotFound(String),
    /// Handler found nothing to apply.
    Irrelevant(String),
    /// Downstream refused the event with this status.
    Rejected(u16),
}

/// A fatal handler failure, kept for the run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalFailure {
    pub message_id: String,
    pub event_id: String,
    pub dispatch: String,
    pub cause: String,
    /// The handler panicked instead of returning an outcome.
    pub panicked: bool,
}

impl From<FatalFailure> for BridgeError {
    fn from(failure: FatalFailure) -> Self {
        BridgeError::HandlerFatal {
            event_id: failure.event_id,
            dispatch: failure.dispatch,
            cause: failure.cause,
        }
    }
}

/// Final state of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Committed(ChangeSet),
    Dropped(DropReason),
    Retry(String),
    Fatal(FatalFailure),
}

/// Summary returned when the loop stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReport {
    pub health: BridgeHealth,
    pub fatal_failures: Vec<FatalFailure>,
}

struct Inner {
    config: BridgeConfig,
    registry: HandlerRegistry,
    store: Arc<dyn LegacyStore>,
    forwarder: Option<Forwarder>,
    stats: BridgeStats,
    locks: SubjectLocks,
    cancel: CancellationToken,
    running: AtomicBool,
    fatal_failures: Mutex<Vec<FatalFailure>>,
}

/// Applies identity events from a [`MessageSource`] to the legacy store.
///
/// Cheap to clone; clones share state. A bridge runs once: after
/// [`stop`](Self::stop) it cannot be restarted.
#[derive(Clone)]
pub struct EventBridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl EventBridge {
    /// Create a bridge. A forwarder is built when the config names one.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::ConfigInvalid` for a config that cannot run and
    /// `BridgeError::Forward` when the HTTP client cannot be built.
    pub fn new(
        config: BridgeConfig,
        registry: HandlerRegistry,
        store: Arc<dyn LegacyStore>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let forwarder = match &config.forward {
            Some(forward) => Some(Forwarder::new(forward, config.request_timeout)?),
            None => None,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry,
                store,
                forwarder,
                stats: BridgeStats::default(),
                locks: SubjectLocks::new(),
                cancel: CancellationToken::new(),
                running: AtomicBool::new(false),
                fatal_failures: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Run the loop on a new task.
    pub fn start(
        &self,
        source: Arc<dyn MessageSource>,
    ) -> JoinHandle<Result<BridgeReport, BridgeError>> {
        let bridge = self.clone();
        tokio::spawn(async move { bridge.run(source).await })
    }

    /// Ask the loop to stop pulling messages and drain.
    pub fn stop(&self) {
        info!("Event bridge stop requested");
        self.inner.cancel.cancel();
    }

    /// Token that fires when the bridge shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn health(&self) -> BridgeHealth {
        self.inner
            .stats
            .snapshot(self.inner.running.load(Ordering::SeqCst))
    }

    /// Consume `source` until it is exhausted or the bridge is stopped.
    ///
    /// # Errors
    ///
    /// Returns the source's error if it failed, or
    /// `BridgeError::HandlerFatal` when `halt_on_fatal` is set and a handler
    /// failed fatally.
    pub async fn run(&self, source: Arc<dyn MessageSource>) -> Result<BridgeReport, BridgeError> {
        let config = &self.inner.config;
        let cancel = &self.inner.cancel;
        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            source = source.name(),
            realm = %config.realm,
            max_in_flight = config.max_in_flight,
            "Event bridge started"
        );

        let (tx, mut rx) = mpsc::channel::<Delivery>(config.max_in_flight);
        let source_cancel = cancel.child_token();
        let source_task = {
            let source = Arc::clone(&source);
            let token = source_cancel.clone();
            tokio::spawn(async move { source.run(tx, token).await })
        };

        let semaphore = Arc::new(Semaphore::new(config.max_in_flight));
        let mut workers = JoinSet::new();

        loop {
            while let Some(result) = workers.try_join_next() {
                log_worker_exit(result);
            }

            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let delivery = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                delivery = rx.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let bridge = self.clone();
            workers.spawn(async move {
                let _permit = permit;
                bridge.settle(delivery).await;
            });
        }

        // Stop pulling; anything already buffered goes back to the source.
        source_cancel.cancel();
        rx.close();
        while let Some(delivery) = rx.recv().await {
            let message_id = delivery.message_id.clone();
            if let Err(e) = delivery.nack().await {
                warn!(message_id = %message_id, error = %e, "Failed to return buffered message");
            }
        }

        let drained = tokio::time::timeout(config.shutdown_grace, async {
            while let Some(result) = workers.join_next().await {
                log_worker_exit(result);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_secs = config.shutdown_grace.as_secs(),
                in_flight = workers.len(),
                "Shutdown grace period expired, aborting in-flight handlers"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        let source_result = match source_task.await {
            Ok(result) => result,
            Err(e) => Err(BridgeError::ConsumeFailed {
                source_name: source.name().to_string(),
                cause: e.to_string(),
            }),
        };

        self.inner.running.store(false, Ordering::SeqCst);
        let report = BridgeReport {
            health: self.health(),
            fatal_failures: self
                .inner
                .fatal_failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        info!(
            received = report.health.received,
            committed = report.health.committed,
            dropped = report.health.dropped,
            retried = report.health.retried,
            fatal = report.health.fatal,
            "Event bridge stopped"
        );

        source_result?;
        let halted_by = report
            .fatal_failures
            .iter()
            .find(|failure| config.halt_on_fatal || failure.panicked);
        if let Some(failure) = halted_by {
            return Err(failure.clone().into());
        }
        Ok(report)
    }

    /// Process one delivery and settle it with its source.
    async fn settle(&self, delivery: Delivery) {
        let stats = &self.inner.stats;
        stats.received();
        let message_id = delivery.message_id.clone();
        let disposition = match AssertUnwindSafe(self.process(&message_id, &delivery.data))
            .catch_unwind()
            .await
        {
            Ok(disposition) => disposition,
            Err(panic) => Disposition::Fatal(panic_failure(&message_id, &delivery.data, &*panic)),
        };

        let settled = match disposition {
            Disposition::Committed(changes) => {
                stats.committed();
                info!(
                    message_id = %message_id,
                    changes = changes.changes.len(),
                    audit_entries = changes.audit_entries.len(),
                    "ack"
                );
                delivery.ack().await
            }
            Disposition::Dropped(reason) => {
                stats.dropped();
                info!(message_id = %message_id, reason = ?reason, "ack (dropped)");
                delivery.ack().await
            }
            Disposition::Retry(cause) => {
                stats.retried();
                warn!(
                    message_id = %message_id,
                    cause = %cause,
                    backoff_ms = self.inner.config.nack_backoff.as_millis() as u64,
                    "Transient failure, nack"
                );
                tokio::select! {
                    () = self.inner.cancel.cancelled() => {}
                    () = tokio::time::sleep(self.inner.config.nack_backoff) => {}
                }
                delivery.nack().await
            }
            Disposition::Fatal(failure) => {
                stats.fatal();
                error!(
                    message_id = %message_id,
                    event_id = %failure.event_id,
                    dispatch = %failure.dispatch,
                    cause = %failure.cause,
                    "Handler failed, nack"
                );
                if self.inner.config.halt_on_fatal || failure.panicked {
                    self.inner.cancel.cancel();
                }
                self.inner
                    .fatal_failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(failure);
                delivery.nack().await
            }
        };

        if let Err(e) = settled {
            warn!(message_id = %message_id, error = %e, "Failed to settle message");
        }
        stats.settled();
    }

    /// Decide what one message does to the legacy store.
    ///
    /// Writes are committed only for [`Disposition::Committed`]; every
    /// other disposition rolls back.
    #[instrument(skip(self, data), fields(event_id = Empty, dispatch = Empty))]
    pub async fn process(&self, message_id: &str, data: &[u8]) -> Disposition {
        let config = &self.inner.config;
        debug!(len = data.len(), "Message received");

        let event = match IdentityEvent::from_bytes(data) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Undecodable message");
                return Disposition::Dropped(DropReason::InvalidEnvelope(e.to_string()));
            }
        };
        let span = tracing::Span::current();
        span.record("event_id", event.event_id());

        if event.realm() != Some(config.realm.as_str()) {
            info!(realm = ?event.realm(), "Not for {} - ack", config.realm);
            return Disposition::Dropped(DropReason::RealmMismatch(
                event.realm().map(str::to_string),
            ));
        }

        let Some(key) = event.dispatch_key() else {
            info!("Event names no operation");
            return Disposition::Dropped(DropReason::Unregistered("dispatch_none".to_string()));
        };
        let dispatch = key.dispatch_name();
        span.record("dispatch", dispatch.as_str());

        let Some(handler) = self.inner.registry.lookup(&key) else {
            info!("Dispatch {dispatch} does not exist");
            return Disposition::Dropped(DropReason::Unregistered(dispatch));
        };

        let representation = match event.representation() {
            Ok(representation) => representation,
            Err(e) => {
                warn!(error = %e, "Undecodable representation");
                return Disposition::Dropped(DropReason::InvalidEnvelope(e.to_string()));
            }
        };

        let _subject = match event.subject_user_id() {
            Some(subject) => Some(self.inner.locks.acquire(subject).await),
            None => None,
        };

        let fatal = |cause: String| {
            Disposition::Fatal(FatalFailure {
                message_id: message_id.to_string(),
                event_id: event.event_id().to_string(),
                dispatch: dispatch.clone(),
                cause,
                panicked: false,
            })
        };

        let mut tx = match self.inner.store.begin().await {
            Ok(tx) => tx,
            Err(e) if e.is_transient() => return Disposition::Retry(e.to_string()),
            Err(e) => return fatal(e.to_string()),
        };

        debug!("dispatch {dispatch}");
        let ctx = HandlerContext::now(config.audit_admin_user);
        let outcome = handler.handle(&ctx, &event, &representation, &mut *tx).await;

        match outcome {
            Outcome::Applied(changes) => {
                if let Some(forwarder) = &self.inner.forwarder {
                    match forwarder.forward(&event).await {
                        ForwardOutcome::Accepted => {}
                        ForwardOutcome::Transient(cause) => {
                            rollback(tx).await;
                            return Disposition::Retry(cause);
                        }
                        ForwardOutcome::Rejected(status) => {
                            rollback(tx).await;
                            return Disposition::Dropped(DropReason::Rejected(status));
                        }
                    }
                }
                match tx.commit().await {
                    Ok(()) => Disposition::Committed(changes),
                    Err(e) if e.is_transient() => Disposition::Retry(e.to_string()),
                    Err(e) => fatal(e.to_string()),
                }
            }
            Outcome::Skipped(SkipReason::NotFound(what)) => {
                rollback(tx).await;
                warn!(missing = %what, "No such user");
                Disposition::Dropped(DropReason::NotFound(what))
            }
            Outcome::Skipped(SkipReason::Irrelevant(why)) => {
                rollback(tx).await;
                info!(reason = %why, "Nothing to apply");
                Disposition::Dropped(DropReason::Irrelevant(why))
            }
            Outcome::Failed(FailureKind::Transient(cause)) => {
                rollback(tx).await;
                Disposition::Retry(cause)
            }
            Outcome::Failed(FailureKind::Fatal(cause)) => {
                rollback(tx).await;
                fatal(cause)
            }
        }
    }
}

async fn rollback(tx: Box<dyn LegacyTx>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}

/// Describe a panic raised while processing `data`.
fn panic_failure(message_id: &str, data: &[u8], panic: &(dyn Any + Send)) -> FatalFailure {
    let event = IdentityEvent::from_bytes(data).ok();
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    FatalFailure {
        message_id: message_id.to_string(),
        event_id: event
            .as_ref()
            .map_or("-", |event| event.event_id())
            .to_string(),
        dispatch: event
            .as_ref()
            .and_then(|event| event.dispatch_key())
            .map_or_else(|| "dispatch_none".to_string(), |key| key.dispatch_name()),
        cause: format!("handler panicked: {message}"),
        panicked: true,
    }
}

fn log_worker_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Bridge worker panicked");
        }
    }
}
