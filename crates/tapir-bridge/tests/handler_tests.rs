//! Handlers applied directly against the in-memory store.

mod common;

use common::{session_event, user, user_update_event, MemoryStore, ADMIN_USER};
use serde_json::{json, Value};
use tapir_bridge::handlers::{UserProfileHandler, VerifyEmailHandler};
use tapir_bridge::{
    ChangeSet, Handler, HandlerContext, IdentityEvent, LegacyStore, Outcome, SkipReason,
};
use tapir_db::{TapirEmailChangeToken, TapirSession};

fn ctx() -> HandlerContext {
    HandlerContext {
        audit_admin_user: Some(ADMIN_USER),
        timestamp: 1_738_005_900,
    }
}

async fn apply(store: &MemoryStore, handler: &dyn Handler, body: &Value) -> Outcome {
    let event: IdentityEvent = serde_json::from_value(body.clone()).unwrap();
    let representation = event.representation().unwrap();
    let mut tx = store.begin().await.unwrap();
    let outcome = handler.handle(&ctx(), &event, &representation, &mut *tx).await;
    if matches!(outcome, Outcome::Applied(_)) {
        tx.commit().await.unwrap();
    } else {
        tx.rollback().await.unwrap();
    }
    outcome
}

fn applied(outcome: Outcome) -> ChangeSet {
    match outcome {
        Outcome::Applied(changes) => changes,
        other => panic!("expected Applied, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_user_update_changes_only_differing_names() {
    let store = MemoryStore::new().with_user(user(1212));
    let event = user_update_event(
        "evt-1",
        json!({
            "id": "1212",
            "username": "reader",
            "firstName": "Ada",
            "lastName": "Byron",
            "email": "no-mail@example.com",
            "emailVerified": false
        }),
    );

    let changes = applied(apply(&store, &UserProfileHandler, &event).await);
    let fields: Vec<&str> = changes.changes.iter().map(|c| c.field.as_str()).collect();
    assert_eq!(fields, vec!["username", "last_name"]);
    assert!(changes.audit_entries.is_empty());

    let state = store.snapshot();
    assert_eq!(state.nicknames[&1212], "reader");
    assert_eq!(state.users[&1212].last_name.as_deref(), Some("Byron"));
    assert_eq!(state.users[&1212].first_name.as_deref(), Some("Ada"));

    let again = applied(apply(&store, &UserProfileHandler, &event).await);
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_user_update_email_verified_is_audited() {
    let store = MemoryStore::new().with_user(user(1212));
    let event = user_update_event("evt-1", json!({"id": "1212", "emailVerified": true}));

    let changes = applied(apply(&store, &UserProfileHandler, &event).await);
    assert_eq!(changes.changes.len(), 1);
    assert_eq!(changes.changes[0].field, "flag_email_verified");
    assert_eq!(store.user(1212).unwrap().flag_email_verified, 1);

    let audit = store.audit_rows();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].data, "tapir_users.flag_email_verified=1");
    assert_eq!(audit[0].admin_user, 7);
    assert_eq!(audit[0].ip_addr, "10.0.0.1");

    let again = applied(apply(&store, &UserProfileHandler, &event).await);
    assert!(again.is_empty());
    assert_eq!(store.audit_rows().len(), 1);
}

#[tokio::test]
async fn test_user_update_falls_back_to_resource_path() {
    let store = MemoryStore::new().with_user(user(55));
    let mut event = user_update_event("evt-1", json!({"firstName": "Grace"}));
    event["resourcePath"] = json!("users/55");

    let changes = applied(apply(&store, &UserProfileHandler, &event).await);
    assert_eq!(changes.changes[0].field, "first_name");
    assert_eq!(
        store.user(55).unwrap().first_name.as_deref(),
        Some("Grace")
    );
}

#[tokio::test]
async fn test_user_update_for_non_legacy_id_is_not_found() {
    let store = MemoryStore::new().with_user(user(1));
    let event = user_update_event(
        "evt-1",
        json!({"id": "ce43077d-2b2b-4090-996f-d11757b32e83", "firstName": "X"}),
    );

    let outcome = apply(&store, &UserProfileHandler, &event).await;
    assert!(matches!(outcome, Outcome::Skipped(SkipReason::NotFound(_))));
}

// ---------------------------------------------------------------------------
// Email verification
// ---------------------------------------------------------------------------

fn pending_token(user_id: u32, secret: &str, new_email: &str, issued_when: i64) -> TapirEmailChangeToken {
    TapirEmailChangeToken {
        user_id,
        old_email: Some(format!("user{user_id}@example.org")),
        new_email: Some(new_email.to_string()),
        secret: secret.to_string(),
        issued_when,
        used: 0,
        session_id: Some(300),
    }
}

fn session(user_id: u32, session_id: u32) -> TapirSession {
    TapirSession {
        session_id,
        user_id,
        start_time: 1_738_000_000,
        end_time: 0,
    }
}

#[tokio::test]
async fn test_verify_email_consumes_newest_token_once() {
    let store = MemoryStore::new()
        .with_user(user(42))
        .with_session(session(42, 300))
        .with_session(session(42, 301))
        .with_token(pending_token(42, "old-secret", "new@example.org", 100))
        .with_token(pending_token(42, "new-secret", "new@example.org", 200));
    let event = session_event(
        "evt-1",
        "VERIFY_EMAIL",
        "42",
        json!({"email": "new@example.org"}),
    );

    let changes = applied(apply(&store, &VerifyEmailHandler, &event).await);
    let fields: Vec<&str> = changes.changes.iter().map(|c| c.field.as_str()).collect();
    assert_eq!(fields, vec!["email_change_token", "flag_email_verified", "email"]);

    let state = store.snapshot();
    assert_eq!(state.users[&42].email, "new@example.org");
    assert_eq!(state.users[&42].flag_email_verified, 1);
    assert_eq!(state.used_tokens.len(), 1);
    let (user_id, secret, usage) = &state.used_tokens[0];
    assert_eq!(*user_id, 42);
    assert_eq!(secret, "new-secret");
    assert_eq!(usage.session_id, 301);
    assert_eq!(usage.remote_ip, "192.0.2.33");
    assert_eq!(usage.used_when, 1_738_005_800);

    // The older token is still pending, so the second delivery consumes it
    // without touching the already-verified profile again.
    let second = applied(apply(&store, &VerifyEmailHandler, &event).await);
    assert_eq!(second.changes.len(), 1);
    let third = applied(apply(&store, &VerifyEmailHandler, &event).await);
    assert!(third.is_empty());
    assert_eq!(store.snapshot().used_tokens.len(), 2);
}

#[tokio::test]
async fn test_verify_email_without_pending_token_is_noop() {
    let store = MemoryStore::new()
        .with_user(user(42))
        .with_session(session(42, 300));
    let event = session_event("evt-1", "VERIFY_EMAIL", "42", json!({}));

    let changes = applied(apply(&store, &VerifyEmailHandler, &event).await);
    assert!(changes.is_empty());
    assert_eq!(store.user(42).unwrap(), user(42));
}

#[tokio::test]
async fn test_verify_email_without_session_is_not_found() {
    let store = MemoryStore::new()
        .with_user(user(42))
        .with_token(pending_token(42, "s", "new@example.org", 100));
    let event = session_event("evt-1", "VERIFY_EMAIL", "42", json!({}));

    let outcome = apply(&store, &VerifyEmailHandler, &event).await;
    assert!(matches!(outcome, Outcome::Skipped(SkipReason::NotFound(_))));
    assert!(store.snapshot().used_tokens.is_empty());
}

#[tokio::test]
async fn test_verify_email_matches_requested_address() {
    let store = MemoryStore::new()
        .with_user(user(42))
        .with_session(session(42, 300))
        .with_token(pending_token(42, "a", "first@example.org", 100))
        .with_token(pending_token(42, "b", "second@example.org", 200));
    let event = session_event(
        "evt-1",
        "VERIFY_EMAIL",
        "42",
        json!({"email": "first@example.org"}),
    );

    applied(apply(&store, &VerifyEmailHandler, &event).await);
    let state = store.snapshot();
    assert_eq!(state.used_tokens[0].1, "a");
    assert_eq!(state.users[&42].email, "first@example.org");
}
