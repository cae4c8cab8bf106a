//! In-process message source.
//!
//! Backs local runs and tests. Nacked messages go back on the queue, and
//! every settlement is recorded so callers can inspect what happened.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Acker, Delivery, MessageSource};
use crate::error::BridgeError;

#[derive(Debug, Clone)]
struct Queued {
    id: String,
    data: Vec<u8>,
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Nacked,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<VecDeque<Queued>>,
    notify: Notify,
    /// Deliveries handed out but not yet settled.
    outstanding: AtomicUsize,
    closed: AtomicBool,
    redelivery_limit: Option<usize>,
    log: Mutex<Vec<(String, Settlement)>>,
    deliveries: Mutex<HashMap<String, usize>>,
}

impl Shared {
    fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, item: Queued) {
        Self::lock(&self.queue).push_back(item);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Queued> {
        Self::lock(&self.queue).pop_front()
    }

    fn record(&self, id: &str, settlement: Settlement) {
        Self::lock(&self.log).push((id.to_string(), settlement));
    }

    fn delivered(&self, id: &str) -> usize {
        let mut counts = Self::lock(&self.deliveries);
        let count = counts.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn settle(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_drained(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            && self.outstanding.load(Ordering::SeqCst) == 0
            && Self::lock(&self.queue).is_empty()
    }
}

/// Receiving half, consumed by the bridge.
pub struct ChannelSource {
    shared: Arc<Shared>,
}

/// Sending half, kept by the producer (or test).
#[derive(Clone)]
pub struct ChannelPublisher {
    shared: Arc<Shared>,
}

impl ChannelSource {
    /// A source that redelivers nacked messages without limit.
    pub fn new() -> (Self, ChannelPublisher) {
        Self::build(None)
    }

    /// A source that stops redelivering a message after `limit` deliveries.
    pub fn with_redelivery_limit(limit: usize) -> (Self, ChannelPublisher) {
        Self::build(Some(limit))
    }

    fn build(redelivery_limit: Option<usize>) -> (Self, ChannelPublisher) {
        let shared = Arc::new(Shared {
            redelivery_limit,
            ..Shared::default()
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ChannelPublisher { shared },
        )
    }
}

impl ChannelPublisher {
    pub fn publish(&self, message_id: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.shared.push(Queued {
            id: message_id.into(),
            data: data.into(),
        });
    }

    /// No more messages will be published; the source finishes once every
    /// delivery is settled.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
    }

    /// Settlements in the order they happened.
    pub fn settlements(&self) -> Vec<(String, Settlement)> {
        Shared::lock(&self.shared.log).clone()
    }

    pub fn acked(&self) -> Vec<String> {
        self.filtered(Settlement::Acked)
    }

    pub fn nacked(&self) -> Vec<String> {
        self.filtered(Settlement::Nacked)
    }

    /// How many times `message_id` was handed to the bridge.
    pub fn delivery_count(&self, message_id: &str) -> usize {
        Shared::lock(&self.shared.deliveries)
            .get(message_id)
            .copied()
            .unwrap_or(0)
    }

    fn filtered(&self, wanted: Settlement) -> Vec<String> {
        Shared::lock(&self.shared.log)
            .iter()
            .filter(|(_, s)| *s == wanted)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

struct ChannelAcker {
    shared: Arc<Shared>,
    item: Queued,
    attempt: usize,
}

#[async_trait]
impl Acker for ChannelAcker {
    async fn ack(self: Box<Self>) -> Result<(), BridgeError> {
        self.shared.record(&self.item.id, Settlement::Acked);
        self.shared.settle();
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<(), BridgeError> {
        self.shared.record(&self.item.id, Settlement::Nacked);
        let exhausted = self
            .shared
            .redelivery_limit
            .is_some_and(|limit| self.attempt >= limit);
        if exhausted {
            debug!(message_id = %self.item.id, attempt = self.attempt, "Redelivery limit reached");
        } else {
            // Requeue before settling so the source never looks drained in between.
            self.shared.push(self.item.clone());
        }
        self.shared.settle();
        Ok(())
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    async fn run(
        &self,
        tx: mpsc::Sender<Delivery>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        loop {
            if let Some(item) = self.shared.pop() {
                let attempt = self.shared.delivered(&item.id);
                self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
                let delivery = Delivery::new(
                    item.id.clone(),
                    item.data.clone(),
                    Box::new(ChannelAcker {
                        shared: Arc::clone(&self.shared),
                        item,
                        attempt,
                    }),
                );
                tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    sent = tx.send(delivery) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
                continue;
            }

            if self.shared.is_drained() {
                debug!("Channel source drained");
                return Ok(());
            }

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = self.shared.notify.notified() => {}
            }
        }
    }
}
