//! Bridge and Kafka configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::BridgeError;

/// Realm whose events are applied; everything else is acknowledged and dropped.
pub const DEFAULT_REALM: &str = "arxiv";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
pub const DEFAULT_NACK_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Downstream endpoint that receives every applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardConfig {
    pub url: String,
    pub token: String,
}

/// Runtime settings of the event bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub realm: String,
    /// Upper bound on concurrently running handlers.
    pub max_in_flight: usize,
    /// Delay before a transiently failed message is negatively acknowledged.
    pub nack_backoff: Duration,
    /// How long shutdown waits for in-flight handlers.
    pub shutdown_grace: Duration,
    /// Timeout of each downstream HTTP call.
    pub request_timeout: Duration,
    /// Legacy user id recorded as the acting admin on bridge-written audit
    /// rows when the event names none.
    pub audit_admin_user: Option<u32>,
    /// Stop the bridge on the first fatal handler failure.
    pub halt_on_fatal: bool,
    pub forward: Option<ForwardConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            nack_backoff: Duration::from_millis(DEFAULT_NACK_BACKOFF_MS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            audit_admin_user: None,
            halt_on_fatal: false,
            forward: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `BRIDGE_REALM`: realm to apply (default: "arxiv")
    /// - `BRIDGE_MAX_IN_FLIGHT`: concurrent handlers (default: 8)
    /// - `BRIDGE_NACK_BACKOFF_MS`: delay before nack on transient failure (default: 5000)
    /// - `BRIDGE_SHUTDOWN_GRACE_SECS`: in-flight drain timeout (default: 30)
    /// - `BRIDGE_REQUEST_TIMEOUT_SECS`: downstream request timeout (default: 10)
    /// - `BRIDGE_AUDIT_ADMIN_USER`: fallback acting admin for audit rows
    /// - `BRIDGE_HALT_ON_FATAL`: stop on the first fatal failure (default: false)
    /// - `BRIDGE_FORWARD_URL`, `BRIDGE_FORWARD_TOKEN`: downstream forwarder
    pub fn from_env() -> Result<Self, BridgeError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let realm = lookup("BRIDGE_REALM").unwrap_or_else(|| DEFAULT_REALM.to_string());
        let max_in_flight = parse_var(&lookup, "BRIDGE_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT)?;
        let nack_backoff_ms = parse_var(&lookup, "BRIDGE_NACK_BACKOFF_MS", DEFAULT_NACK_BACKOFF_MS)?;
        let grace_secs =
            parse_var(&lookup, "BRIDGE_SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?;
        let timeout_secs =
            parse_var(&lookup, "BRIDGE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let halt_on_fatal = parse_var(&lookup, "BRIDGE_HALT_ON_FATAL", false)?;
        let audit_admin_user = match lookup("BRIDGE_AUDIT_ADMIN_USER") {
            Some(v) => Some(v.parse::<u32>().map_err(|e| BridgeError::ConfigInvalid {
                var: "BRIDGE_AUDIT_ADMIN_USER".to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        let forward = match lookup("BRIDGE_FORWARD_URL") {
            Some(url) => {
                let token = lookup("BRIDGE_FORWARD_TOKEN").ok_or(BridgeError::ConfigMissing {
                    var: "BRIDGE_FORWARD_TOKEN".to_string(),
                })?;
                Some(ForwardConfig { url, token })
            }
            None => None,
        };

        let config = Self {
            realm,
            max_in_flight,
            nack_backoff: Duration::from_millis(nack_backoff_ms),
            shutdown_grace: Duration::from_secs(grace_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            audit_admin_user,
            halt_on_fatal,
            forward,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Check values that parse but cannot run.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::ConfigInvalid` for an empty realm or a zero
    /// in-flight bound.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.realm.is_empty() {
            return Err(BridgeError::ConfigInvalid {
                var: "BRIDGE_REALM".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_in_flight == 0 {
            return Err(BridgeError::ConfigInvalid {
                var: "BRIDGE_MAX_IN_FLIGHT".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T, BridgeError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(v) => v.trim().parse::<T>().map_err(|e| BridgeError::ConfigInvalid {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Builder for `BridgeConfig`.
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = realm.into();
        self
    }

    #[must_use]
    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.config.max_in_flight = max_in_flight;
        self
    }

    #[must_use]
    pub fn nack_backoff(mut self, backoff: Duration) -> Self {
        self.config.nack_backoff = backoff;
        self
    }

    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn audit_admin_user(mut self, user_id: u32) -> Self {
        self.config.audit_admin_user = Some(user_id);
        self
    }

    #[must_use]
    pub fn halt_on_fatal(mut self, halt: bool) -> Self {
        self.config.halt_on_fatal = halt;
        self
    }

    pub fn forward(mut self, url: impl Into<String>, token: impl Into<String>) -> Self {
        self.config.forward = Some(ForwardConfig {
            url: url.into(),
            token: token.into(),
        });
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<BridgeConfig, BridgeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Security protocol for Kafka connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl FromStr for SecurityProtocol {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLAINTEXT" => Ok(Self::Plaintext),
            "SSL" => Ok(Self::Ssl),
            "SASL_PLAINTEXT" => Ok(Self::SaslPlaintext),
            "SASL_SSL" => Ok(Self::SaslSsl),
            _ => Err(BridgeError::ConfigInvalid {
                var: "KAFKA_SECURITY_PROTOCOL".to_string(),
                reason: format!("Unknown protocol: {s}"),
            }),
        }
    }
}

impl SecurityProtocol {
    /// Convert to rdkafka string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }

    fn uses_sasl(&self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }
}

/// SASL mechanism for authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl FromStr for SaslMechanism {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM_SHA_256" => Ok(Self::ScramSha256),
            "SCRAM_SHA_512" => Ok(Self::ScramSha512),
            _ => Err(BridgeError::ConfigInvalid {
                var: "KAFKA_SASL_MECHANISM".to_string(),
                reason: format!("Unknown mechanism: {s}"),
            }),
        }
    }
}

impl SaslMechanism {
    /// Convert to rdkafka string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// SASL credentials for authentication.
#[derive(Debug, Clone)]
pub struct SaslCredentials {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: String,
}

/// Kafka connection and subscription settings.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated list of broker addresses.
    pub bootstrap_servers: String,
    pub security_protocol: SecurityProtocol,
    pub sasl: Option<SaslCredentials>,
    pub client_id: String,
    /// Topic carrying identity provider events.
    pub topic: String,
    pub consumer_group: String,
}

impl KafkaConfig {
    pub const DEFAULT_CLIENT_ID: &'static str = "tapir-bridge";
    pub const DEFAULT_TOPIC: &'static str = "keycloak-arxiv-events";
    pub const DEFAULT_CONSUMER_GROUP: &'static str = "keycloak-tapir-bridge";

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `KAFKA_BOOTSTRAP_SERVERS`: Comma-separated broker list
    ///
    /// Optional:
    /// - `KAFKA_SECURITY_PROTOCOL`: PLAINTEXT (default), SSL, `SASL_PLAINTEXT`, `SASL_SSL`
    /// - `KAFKA_CLIENT_ID`: Client identifier (default: "tapir-bridge")
    /// - `KAFKA_TOPIC`: Event topic (default: "keycloak-arxiv-events")
    /// - `KAFKA_CONSUMER_GROUP`: Consumer group (default: "keycloak-tapir-bridge")
    /// - `KAFKA_SASL_MECHANISM`, `KAFKA_SASL_USERNAME`, `KAFKA_SASL_PASSWORD`: required if SASL
    pub fn from_env() -> Result<Self, BridgeError> {
        let required = |var: &str| {
            env::var(var).map_err(|_| BridgeError::ConfigMissing {
                var: var.to_string(),
            })
        };

        let bootstrap_servers = required("KAFKA_BOOTSTRAP_SERVERS")?;

        let security_protocol = match env::var("KAFKA_SECURITY_PROTOCOL") {
            Ok(v) => SecurityProtocol::from_str(&v)?,
            Err(_) => SecurityProtocol::Plaintext,
        };

        let sasl = if security_protocol.uses_sasl() {
            Some(SaslCredentials {
                mechanism: SaslMechanism::from_str(&required("KAFKA_SASL_MECHANISM")?)?,
                username: required("KAFKA_SASL_USERNAME")?,
                password: required("KAFKA_SASL_PASSWORD")?,
            })
        } else {
            None
        };

        Ok(Self {
            bootstrap_servers,
            security_protocol,
            sasl,
            client_id: env::var("KAFKA_CLIENT_ID")
                .unwrap_or_else(|_| Self::DEFAULT_CLIENT_ID.to_string()),
            topic: env::var("KAFKA_TOPIC").unwrap_or_else(|_| Self::DEFAULT_TOPIC.to_string()),
            consumer_group: env::var("KAFKA_CONSUMER_GROUP")
                .unwrap_or_else(|_| Self::DEFAULT_CONSUMER_GROUP.to_string()),
        })
    }

    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> KafkaConfigBuilder {
        KafkaConfigBuilder::default()
    }
}

/// Builder for `KafkaConfig`.
#[derive(Debug, Default)]
pub struct KafkaConfigBuilder {
    bootstrap_servers: Option<String>,
    security_protocol: Option<SecurityProtocol>,
    sasl: Option<SaslCredentials>,
    client_id: Option<String>,
    topic: Option<String>,
    consumer_group: Option<String>,
}

impl KafkaConfigBuilder {
    pub fn bootstrap_servers(mut self, servers: impl Into<String>) -> Self {
        self.bootstrap_servers = Some(servers.into());
        self
    }

    #[must_use]
    pub fn security_protocol(mut self, protocol: SecurityProtocol) -> Self {
        self.security_protocol = Some(protocol);
        self
    }

    #[must_use]
    pub fn sasl(mut self, mechanism: SaslMechanism, username: String, password: String) -> Self {
        self.sasl = Some(SaslCredentials {
            mechanism,
            username,
            password,
        });
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = Some(group.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<KafkaConfig, BridgeError> {
        let bootstrap_servers = self.bootstrap_servers.ok_or(BridgeError::ConfigMissing {
            var: "bootstrap_servers".to_string(),
        })?;

        let security_protocol = self
            .security_protocol
            .unwrap_or(SecurityProtocol::Plaintext);

        if security_protocol.uses_sasl() && self.sasl.is_none() {
            return Err(BridgeError::ConfigMissing {
                var: "sasl_credentials".to_string(),
            });
        }

        Ok(KafkaConfig {
            bootstrap_servers,
            security_protocol,
            sasl: self.sasl,
            client_id: self
                .client_id
                .unwrap_or_else(|| KafkaConfig::DEFAULT_CLIENT_ID.to_string()),
            topic: self
                .topic
                .unwrap_or_else(|| KafkaConfig::DEFAULT_TOPIC.to_string()),
            consumer_group: self
                .consumer_group
                .unwrap_or_else(|| KafkaConfig::DEFAULT_CONSUMER_GROUP.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_bridge_defaults() {
        let config = BridgeConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.realm, "arxiv");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.shutdown_grace, Duration::from_secs(30));
    }

    #[test]
    fn test_bridge_overrides() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("BRIDGE_REALM", "test"),
            ("BRIDGE_MAX_IN_FLIGHT", "2"),
            ("BRIDGE_NACK_BACKOFF_MS", "250"),
            ("BRIDGE_AUDIT_ADMIN_USER", "1"),
            ("BRIDGE_HALT_ON_FATAL", "true"),
            ("BRIDGE_FORWARD_URL", "http://localhost:9000/events"),
            ("BRIDGE_FORWARD_TOKEN", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.realm, "test");
        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.nack_backoff, Duration::from_millis(250));
        assert_eq!(config.audit_admin_user, Some(1));
        assert!(config.halt_on_fatal);
        assert_eq!(config.forward.unwrap().token, "secret");
    }

    #[test]
    fn test_bridge_invalid_number() {
        let err = BridgeConfig::from_lookup(lookup_from(&[("BRIDGE_MAX_IN_FLIGHT", "lots")]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ConfigInvalid { ref var, .. } if var == "BRIDGE_MAX_IN_FLIGHT"));
    }

    #[test]
    fn test_bridge_zero_in_flight_rejected() {
        let err = BridgeConfig::builder().max_in_flight(0).build().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_forward_url_requires_token() {
        let err = BridgeConfig::from_lookup(lookup_from(&[(
            "BRIDGE_FORWARD_URL",
            "http://localhost:9000/events",
        )]))
        .unwrap_err();
        assert!(matches!(err, BridgeError::ConfigMissing { ref var } if var == "BRIDGE_FORWARD_TOKEN"));
    }

    #[test]
    fn test_security_protocol_from_str() {
        assert_eq!(
            "sasl_ssl".parse::<SecurityProtocol>().unwrap(),
            SecurityProtocol::SaslSsl
        );
        assert!("INVALID".parse::<SecurityProtocol>().is_err());
    }

    #[test]
    fn test_sasl_mechanism_from_str() {
        assert_eq!(
            "SCRAM-SHA-512".parse::<SaslMechanism>().unwrap(),
            SaslMechanism::ScramSha512
        );
        assert!("INVALID".parse::<SaslMechanism>().is_err());
    }

    #[test]
    fn test_kafka_builder_defaults() {
        let config = KafkaConfig::builder()
            .bootstrap_servers("localhost:9092")
            .build()
            .unwrap();
        assert_eq!(config.client_id, "tapir-bridge");
        assert_eq!(config.topic, "keycloak-arxiv-events");
        assert_eq!(config.consumer_group, "keycloak-tapir-bridge");
        assert!(config.sasl.is_none());
    }

    #[test]
    fn test_kafka_builder_sasl_without_credentials() {
        let result = KafkaConfig::builder()
            .bootstrap_servers("localhost:9092")
            .security_protocol(SecurityProtocol::SaslSsl)
            .build();
        if let Err(BridgeError::ConfigMissing { var }) = result {
            assert_eq!(var, "sasl_credentials");
        } else {
            panic!("Expected ConfigMissing error");
        }
    }
}
