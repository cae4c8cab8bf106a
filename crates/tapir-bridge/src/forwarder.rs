//! Downstream forwarding of applied events.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::config::ForwardConfig;
use crate::envelope::IdentityEvent;
use crate::error::BridgeError;

/// Result of one forward attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// 2xx response.
    Accepted,
    /// 5xx, timeout or connection failure. Worth redelivering.
    Transient(String),
    /// Any other status.
    Rejected(u16),
}

/// POSTs the decoded envelope to a downstream endpoint.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    url: String,
    token: String,
}

impl Forwarder {
    /// Build a forwarder whose every request times out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Forward` if the HTTP client cannot be built.
    pub fn new(config: &ForwardConfig, timeout: Duration) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tapir-bridge/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| BridgeError::Forward {
                cause: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn forward(&self, event: &IdentityEvent) -> ForwardOutcome {
        let result = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(event)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!(event_id = event.event_id(), status = status.as_u16(), "Event forwarded");
                    ForwardOutcome::Accepted
                } else if status.is_server_error() {
                    warn!(event_id = event.event_id(), status = status.as_u16(), "Downstream error");
                    ForwardOutcome::Transient(format!("HTTP {}", status.as_u16()))
                } else {
                    warn!(event_id = event.event_id(), status = status.as_u16(), "Downstream rejected event");
                    ForwardOutcome::Rejected(status.as_u16())
                }
            }
            Err(e) => {
                let error_msg = if e.is_timeout() {
                    "Request timeout".to_string()
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                };
                warn!(event_id = event.event_id(), error = %error_msg, "Forwarding failed");
                ForwardOutcome::Transient(error_msg)
            }
        }
    }
}
