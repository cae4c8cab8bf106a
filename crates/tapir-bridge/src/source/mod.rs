//! Message sources feeding the bridge.
//!
//! A source pushes [`Delivery`] values into a bounded channel; each delivery
//! carries its own [`Acker`] so the bridge can settle it from whichever
//! worker processed it.

pub mod channel;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;

pub use channel::{ChannelPublisher, ChannelSource};

/// Settles one delivery with the source it came from.
#[async_trait]
pub trait Acker: Send {
    /// The message was handled; do not deliver it again.
    async fn ack(self: Box<Self>) -> Result<(), BridgeError>;

    /// The message was not handled; deliver it again.
    async fn nack(self: Box<Self>) -> Result<(), BridgeError>;
}

/// One received message.
pub struct Delivery {
    pub message_id: String,
    pub data: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.message_id)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Delivery {
    pub fn new(message_id: impl Into<String>, data: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self {
            message_id: message_id.into(),
            data,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), BridgeError> {
        self.acker.ack().await
    }

    pub async fn nack(self) -> Result<(), BridgeError> {
        self.acker.nack().await
    }
}

/// Produces deliveries until cancelled or exhausted.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Push deliveries into `tx` until `cancel` fires, the receiver is
    /// dropped, or the source has nothing more to deliver.
    async fn run(
        &self,
        tx: mpsc::Sender<Delivery>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError>;
}
