//! # tapir-bridge
//!
//! Applies identity provider change events to the legacy tapir store.
//!
//! Events arrive at least once and in any order. Every handler compares the
//! desired state with what is stored and writes only differences inside a
//! per-message transaction, so redelivery is a no-op.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tapir_bridge::{BridgeConfig, ChannelSource, EventBridge, HandlerRegistry, MySqlLegacyStore};
//!
//! # async fn example(pool: sqlx::MySqlPool) -> Result<(), tapir_bridge::BridgeError> {
//! let store = Arc::new(MySqlLegacyStore::new(pool));
//! let bridge = EventBridge::new(BridgeConfig::from_env()?, HandlerRegistry::standard(), store)?;
//!
//! let (source, publisher) = ChannelSource::new();
//! publisher.publish("m1", br#"{"type":"LOGIN","realmName":"arxiv","userId":"1"}"#.to_vec());
//! publisher.close();
//!
//! let report = bridge.run(Arc::new(source)).await?;
//! assert_eq!(report.health.committed, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `kafka`: [`kafka::KafkaSource`], a Kafka consumer source (requires librdkafka)

pub mod bridge;
pub mod config;
pub mod envelope;
pub mod error;
pub mod forwarder;
pub mod handler;
pub mod handlers;
pub mod health;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod locks;
pub mod offsets;
pub mod registry;
pub mod source;
pub mod store;

pub use bridge::{BridgeReport, Disposition, DropReason, EventBridge, FatalFailure};
pub use config::{BridgeConfig, ForwardConfig, KafkaConfig, SaslMechanism, SecurityProtocol};
pub use envelope::{AuthDetails, DispatchKey, IdentityEvent};
pub use error::BridgeError;
pub use forwarder::{ForwardOutcome, Forwarder};
pub use handler::{ChangeSet, FailureKind, Handler, HandlerContext, Outcome, SkipReason};
pub use health::{BridgeHealth, BridgeStats};
pub use locks::SubjectLocks;
pub use offsets::OffsetTracker;
pub use registry::HandlerRegistry;
pub use source::{Acker, ChannelPublisher, ChannelSource, Delivery, MessageSource};
pub use store::mysql::MySqlLegacyStore;
pub use store::{LegacyStore, LegacyTx, TokenUsage, UserProfile};
