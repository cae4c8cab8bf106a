//! Error types for the tapir-bridge crate.

use tapir_audit::AuditError;
use tapir_db::DbError;
use thiserror::Error;

/// Errors that can occur while running the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Configuration errors (permanent, no retry)
    /// Required configuration variable is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    // Message errors (permanent, message is dropped)
    /// Message body is not a usable identity event.
    #[error("Invalid event envelope: {reason}")]
    InvalidEnvelope { reason: String },

    // Source errors (transient)
    /// Failed to pull from or acknowledge on the message source.
    #[error("Failed to consume from {source_name}: {cause}")]
    ConsumeFailed { source_name: String, cause: String },

    /// Failed to connect to the broker or a downstream endpoint.
    #[error("Connection to {target} failed: {cause}")]
    ConnectionFailed { target: String, cause: String },

    /// Downstream forwarder could not be set up or called.
    #[error("Forwarding failed: {cause}")]
    Forward { cause: String },

    /// A handler failed in a way retrying will not fix.
    #[error("Handler {dispatch} failed for event {event_id}: {cause}")]
    HandlerFatal {
        event_id: String,
        dispatch: String,
        cause: String,
    },

    /// Legacy store operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Building an audit entry failed.
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    /// Internal Kafka client error.
    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

impl BridgeError {
    /// Returns true if this error is transient and the message should be
    /// redelivered.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::ConsumeFailed { .. } | BridgeError::ConnectionFailed { .. } => true,
            BridgeError::Database(e) => e.is_transient(),
            BridgeError::Audit(AuditError::Database(e)) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BridgeError::ConfigMissing { .. } | BridgeError::ConfigInvalid { .. }
        )
    }
}

impl From<sqlx::Error> for BridgeError {
    fn from(err: sqlx::Error) -> Self {
        BridgeError::Database(DbError::from(err))
    }
}
