//! Identity provider event envelope.
//!
//! Two message shapes share one topic:
//!
//! | Shape           | Distinguishing fields                                  |
//! |-----------------|--------------------------------------------------------|
//! | resource change | `resourceType`, `operationType`, `resourcePath`, `representation` |
//! | session event   | `type` (`LOGIN`, `LOGOUT`, `VERIFY_EMAIL`, ...), `userId`, `details` |
//!
//! `representation` arrives as a JSON-encoded string. Unknown fields are
//! kept so the envelope can be forwarded downstream unchanged.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::BridgeError;

/// Resource name used for session events.
pub const AUTHN_RESOURCE: &str = "authn";

static USER_PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^users/([^/]+)").expect("valid regex"));

/// Authentication details attached to admin (resource change) events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// A decoded identity provider event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Event time in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_name: Option<String>,

    // Resource change shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_details: Option<AuthDetails>,

    // Session event shape
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Map::is_empty"
    )]
    pub details: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Session events of several types carry `"details": null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl IdentityEvent {
    /// Decode a raw message body.
    pub fn from_bytes(data: &[u8]) -> Result<Self, BridgeError> {
        serde_json::from_slice(data).map_err(|e| BridgeError::InvalidEnvelope {
            reason: e.to_string(),
        })
    }

    /// Identifier used in logs; falls back to a placeholder.
    #[must_use]
    pub fn event_id(&self) -> &str {
        self.id.as_deref().unwrap_or("-")
    }

    /// True for session (login/logout/verify) events.
    #[must_use]
    pub fn is_session_event(&self) -> bool {
        self.resource_type.is_none() && self.event_type.is_some()
    }

    /// Realm the event happened in.
    ///
    /// `authDetails.realmName` is the realm of the acting admin and is not
    /// considered.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.realm_name.as_deref()
    }

    /// The `(resource, operation)` pair used to pick a handler.
    ///
    /// Returns `None` when the event names no operation at all.
    #[must_use]
    pub fn dispatch_key(&self) -> Option<DispatchKey> {
        let operation = self
            .operation_type
            .as_deref()
            .or(self.event_type.as_deref())?;
        let resource = self.resource_type.as_deref().unwrap_or(AUTHN_RESOURCE);
        Some(DispatchKey::new(resource, operation))
    }

    /// The decoded representation.
    ///
    /// An absent representation is an empty object. A string is parsed as
    /// JSON; a string that does not parse is an invalid envelope.
    pub fn representation(&self) -> Result<Value, BridgeError> {
        match &self.representation {
            None | Some(Value::Null) => Ok(Value::Object(Map::new())),
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).map_err(|e| BridgeError::InvalidEnvelope {
                    reason: format!("representation is not valid JSON: {e}"),
                })
            }
            Some(other) => Ok(other.clone()),
        }
    }

    /// Identity the event is about.
    ///
    /// Session events name it in `userId`; resource changes in the
    /// `users/<id>/...` resource path.
    #[must_use]
    pub fn subject_user_id(&self) -> Option<&str> {
        if self.is_session_event() {
            return self.user_id.as_deref();
        }
        let path = self.resource_path.as_deref()?;
        USER_PATH_PATTERN
            .captures(path)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// The acting identity of an admin event, if any.
    #[must_use]
    pub fn actor_user_id(&self) -> Option<&str> {
        self.auth_details.as_ref()?.user_id.as_deref()
    }

    /// A string entry of `details`.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// Lower-cased `(resource, operation)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub resource: String,
    pub operation: String,
}

impl DispatchKey {
    pub fn new(resource: &str, operation: &str) -> Self {
        Self {
            resource: resource.to_lowercase(),
            operation: operation.to_lowercase(),
        }
    }

    /// Conventional handler name, e.g. `dispatch_realm_role_mapping_do_create`.
    #[must_use]
    pub fn dispatch_name(&self) -> String {
        format!("dispatch_{self}")
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_do_{}", self.resource, self.operation)
    }
}
