//! Downstream forwarding: status classification and its effect on commits.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{bytes, role_mapping_event, test_config, user, CaptureResponder, MemoryStore};
use tapir_bridge::{
    BridgeConfig, ChannelSource, Disposition, DropReason, EventBridge, ForwardConfig,
    ForwardOutcome, Forwarder, HandlerRegistry, IdentityEvent,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "forward-token";

fn forward_config(server: &MockServer) -> ForwardConfig {
    ForwardConfig {
        url: format!("{}/events", server.uri()),
        token: TOKEN.to_string(),
    }
}

fn sample_event() -> IdentityEvent {
    serde_json::from_value(role_mapping_event("evt-1", "CREATE", "42", &["Administrator"]))
        .unwrap()
}

fn bridge_with_forwarder(store: &MemoryStore, server: &MockServer) -> EventBridge {
    let config = BridgeConfig {
        forward: Some(forward_config(server)),
        ..test_config()
    };
    EventBridge::new(config, HandlerRegistry::standard(), Arc::new(store.clone())).unwrap()
}

#[tokio::test]
async fn test_forward_success_sends_bearer_and_body() {
    let server = MockServer::start().await;
    let responder = CaptureResponder::new(200);
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(responder.clone())
        .expect(1)
        .mount(&server)
        .await;

    let forwarder = Forwarder::new(&forward_config(&server), Duration::from_secs(5)).unwrap();
    assert_eq!(forwarder.forward(&sample_event()).await, ForwardOutcome::Accepted);

    let requests = responder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].header("authorization"),
        Some("Bearer forward-token")
    );
    let body = requests[0].body_json();
    assert_eq!(body["id"], "evt-1");
    assert_eq!(body["resourcePath"], "users/42/role-mappings/realm");
    assert_eq!(body["resourceTypeAsString"], "REALM_ROLE_MAPPING");
}

#[tokio::test]
async fn test_forward_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let forwarder = Forwarder::new(&forward_config(&server), Duration::from_secs(5)).unwrap();
    assert!(matches!(
        forwarder.forward(&sample_event()).await,
        ForwardOutcome::Transient(_)
    ));
}

#[tokio::test]
async fn test_forward_client_error_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let forwarder = Forwarder::new(&forward_config(&server), Duration::from_secs(5)).unwrap();
    assert_eq!(
        forwarder.forward(&sample_event()).await,
        ForwardOutcome::Rejected(422)
    );
}

#[tokio::test]
async fn test_forward_timeout_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let forwarder = Forwarder::new(&forward_config(&server), Duration::from_millis(50)).unwrap();
    assert!(matches!(
        forwarder.forward(&sample_event()).await,
        ForwardOutcome::Transient(_)
    ));
}

#[tokio::test]
async fn test_forward_connection_refused_is_transient() {
    let config = ForwardConfig {
        url: "http://127.0.0.1:1/events".to_string(),
        token: TOKEN.to_string(),
    };
    let forwarder = Forwarder::new(&config, Duration::from_secs(2)).unwrap();
    assert!(matches!(
        forwarder.forward(&sample_event()).await,
        ForwardOutcome::Transient(_)
    ));
}

#[tokio::test]
async fn test_bridge_commits_after_accepted_forward() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .and(header("authorization", "Bearer forward-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new().with_user(user(42));
    let bridge = bridge_with_forwarder(&store, &server);
    let disposition = bridge
        .process("m1", &bytes(&role_mapping_event("evt-1", "CREATE", "42", &["Administrator"])))
        .await;

    assert!(matches!(disposition, Disposition::Committed(_)));
    assert_eq!(store.commits(), 1);
    assert_eq!(store.user(42).unwrap().flag_edit_users, 1);
}

#[tokio::test]
async fn test_bridge_rolls_back_and_nacks_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = MemoryStore::new().with_user(user(42));
    let bridge = bridge_with_forwarder(&store, &server);

    let (source, publisher) = ChannelSource::with_redelivery_limit(1);
    publisher.publish(
        "m1",
        bytes(&role_mapping_event("evt-1", "CREATE", "42", &["Administrator"])),
    );
    publisher.close();

    let report = bridge.run(Arc::new(source)).await.unwrap();

    assert_eq!(publisher.nacked(), vec!["m1".to_string()]);
    assert_eq!(report.health.retried, 1);
    assert_eq!(store.commits(), 0);
    assert_eq!(store.user(42).unwrap().flag_edit_users, 0);
    assert!(store.audit_rows().is_empty());
}

#[tokio::test]
async fn test_bridge_drops_on_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let store = MemoryStore::new().with_user(user(42));
    let bridge = bridge_with_forwarder(&store, &server);
    let disposition = bridge
        .process("m1", &bytes(&role_mapping_event("evt-1", "CREATE", "42", &["Administrator"])))
        .await;

    assert_eq!(disposition, Disposition::Dropped(DropReason::Rejected(400)));
    assert_eq!(store.commits(), 0);
    assert_eq!(store.rollbacks(), 1);
}
