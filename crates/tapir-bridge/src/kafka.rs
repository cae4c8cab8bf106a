//! Kafka message source.
//!
//! Offsets are committed manually. Messages from one partition settle in any
//! order, so each commit only advances to the partition's watermark (see
//! [`OffsetTracker`]). A nack seeks the partition back to the message, so it
//! and everything after it on that partition are delivered again.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::KafkaConfig;
use crate::error::BridgeError;
use crate::offsets::OffsetTracker;
use crate::source::{Acker, Delivery, MessageSource};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumes identity events from one Kafka topic.
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
    offsets: Arc<Mutex<OffsetTracker>>,
    topic: String,
    consumer_group: String,
}

impl KafkaSource {
    /// Create a consumer for `config.topic` in `config.consumer_group`.
    pub fn new(config: &KafkaConfig) -> Result<Self, BridgeError> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .set("group.id", &config.consumer_group)
            .set("security.protocol", config.security_protocol.as_str())
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "30000");

        if let Some(sasl) = &config.sasl {
            client_config
                .set("sasl.mechanism", sasl.mechanism.as_str())
                .set("sasl.username", &sasl.username)
                .set("sasl.password", &sasl.password);
        }

        let consumer: StreamConsumer =
            client_config
                .create()
                .map_err(|e| BridgeError::ConnectionFailed {
                    target: config.bootstrap_servers.clone(),
                    cause: e.to_string(),
                })?;

        info!(
            consumer_group = %config.consumer_group,
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            "Kafka source created"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            offsets: Arc::new(Mutex::new(OffsetTracker::new())),
            topic: config.topic.clone(),
            consumer_group: config.consumer_group.clone(),
        })
    }
}

struct KafkaAcker {
    consumer: Arc<StreamConsumer>,
    offsets: Arc<Mutex<OffsetTracker>>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl KafkaAcker {
    fn consume_failed(&self, cause: impl ToString) -> BridgeError {
        BridgeError::ConsumeFailed {
            source_name: self.topic.clone(),
            cause: cause.to_string(),
        }
    }

    fn tracker(&self) -> std::sync::MutexGuard<'_, OffsetTracker> {
        self.offsets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Acker for KafkaAcker {
    async fn ack(self: Box<Self>) -> Result<(), BridgeError> {
        let position = self.tracker().ack(&self.topic, self.partition, self.offset);
        let Some(position) = position else {
            debug!(
                topic = %self.topic,
                partition = self.partition,
                offset = self.offset,
                "Earlier offset unsettled, commit deferred"
            );
            return Ok(());
        };
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(position))
            .map_err(|e| self.consume_failed(e))?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| self.consume_failed(e))?;
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<(), BridgeError> {
        self.tracker().nack(&self.topic, self.partition, self.offset);
        self.consumer
            .seek(
                &self.topic,
                self.partition,
                Offset::Offset(self.offset),
                SEEK_TIMEOUT,
            )
            .map_err(|e| self.consume_failed(e))?;
        debug!(
            topic = %self.topic,
            partition = self.partition,
            offset = self.offset,
            "Partition rewound for redelivery"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    fn name(&self) -> &str {
        &self.topic
    }

    #[instrument(skip_all, fields(topic = %self.topic, consumer_group = %self.consumer_group))]
    async fn run(
        &self,
        tx: mpsc::Sender<Delivery>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        self.consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| BridgeError::ConsumeFailed {
                source_name: self.topic.clone(),
                cause: e.to_string(),
            })?;
        info!("Subscribed to topic");

        let mut stream = self.consumer.stream();
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => break,
                next = stream.next() => next,
            };
            let Some(result) = next else {
                break;
            };

            let (acker, payload) = match result {
                Ok(message) => (
                    KafkaAcker {
                        consumer: Arc::clone(&self.consumer),
                        offsets: Arc::clone(&self.offsets),
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                    },
                    message.payload().map(<[u8]>::to_vec),
                ),
                Err(e) => {
                    error!(error = %e, "Error receiving message");
                    continue;
                }
            };

            acker
                .tracker()
                .track(&acker.topic, acker.partition, acker.offset);
            let message_id = format!("{}/{}@{}", acker.topic, acker.partition, acker.offset);
            let Some(payload) = payload else {
                warn!(message_id = %message_id, "Empty payload, acknowledging");
                Box::new(acker).ack().await?;
                continue;
            };
            let delivery = Delivery::new(message_id, payload, Box::new(acker));

            tokio::select! {
                () = cancel.cancelled() => break,
                sent = tx.send(delivery) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        self.consumer.unsubscribe();
        info!("Kafka source stopped");
        Ok(())
    }
}
