//! Common test utilities for tapir-bridge integration tests.
//!
//! Provides an in-memory legacy store with snapshot transactions, event
//! fixtures, and a wiremock responder that captures forwarded requests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tapir_bridge::{BridgeConfig, LegacyStore, LegacyTx, TokenUsage, UserProfile};
use tapir_audit::{AdminAuditEvent, AuditError, HistoryEntry};
use tapir_db::{
    DbError, NewAdminAudit, TapirAdminAudit, TapirEmailChangeToken, TapirSession, TapirUser,
    TapirUserFlag,
};
use wiremock::{Request, Respond, ResponseTemplate};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

pub const REALM: &str = "arxiv";
pub const ADMIN_USER: u32 = 7;

pub fn user(user_id: u32) -> TapirUser {
    TapirUser {
        user_id,
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        email: format!("user{user_id}@example.org"),
        flag_edit_users: 0,
        flag_edit_system: 0,
        flag_approved: 1,
        flag_banned: 0,
        flag_can_lock: 0,
        flag_allow_tex_produced: 0,
        flag_email_verified: 0,
    }
}

/// Config with short timings suitable for tests.
pub fn test_config() -> BridgeConfig {
    BridgeConfig::builder()
        .realm(REALM)
        .max_in_flight(4)
        .nack_backoff(Duration::from_millis(10))
        .shutdown_grace(Duration::from_secs(2))
        .audit_admin_user(ADMIN_USER)
        .build()
        .expect("valid test config")
}

pub fn role_mapping_event(id: &str, operation: &str, user_id: &str, roles: &[&str]) -> Value {
    let representation: Vec<Value> = roles
        .iter()
        .map(|name| json!({"id": format!("role-{name}"), "name": name, "composite": false}))
        .collect();
    json!({
        "id": id,
        "time": 1_727_796_557_187_i64,
        "realmId": "e9b31419-5843-4014-9bd1-f05a2df3b96b",
        "realmName": REALM,
        "authDetails": {
            "realmId": "e34fe449-a841-4c0c-887d-a123a565d315",
            "realmName": "master",
            "clientId": "350cacca-500f-41a5-a1a2-ab57a0df45b4",
            "userId": "84e2038c-3726-463d-a131-0d09c08c0829",
            "ipAddress": "172.17.0.1"
        },
        "resourceType": "REALM_ROLE_MAPPING",
        "operationType": operation,
        "resourcePath": format!("users/{user_id}/role-mappings/realm"),
        "representation": Value::Array(representation).to_string(),
        "resourceTypeAsString": "REALM_ROLE_MAPPING"
    })
}

pub fn user_update_event(id: &str, representation: Value) -> Value {
    let user_id = representation
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("0")
        .to_string();
    json!({
        "id": id,
        "time": 1_738_005_796_557_i64,
        "realmName": REALM,
        "authDetails": {"realmName": "master", "userId": "7", "ipAddress": "10.0.0.1"},
        "resourceType": "USER",
        "operationType": "UPDATE",
        "resourcePath": format!("users/{user_id}"),
        "representation": representation.to_string(),
        "resourceTypeAsString": "USER"
    })
}

pub fn session_event(id: &str, event_type: &str, user_id: &str, details: Value) -> Value {
    json!({
        "id": id,
        "time": 1_738_005_800_000_i64,
        "type": event_type,
        "realmId": "c35229b5-75cf-42d4-aa83-976a0609b73d",
        "realmName": REALM,
        "clientId": "arxiv-user-portal",
        "userId": user_id,
        "sessionId": "kc-session-1",
        "ipAddress": "192.0.2.33",
        "details": details
    })
}

pub fn bytes(event: &Value) -> Vec<u8> {
    event.to_string().into_bytes()
}

// ---------------------------------------------------------------------------
// MemoryStore - in-memory legacy store
// ---------------------------------------------------------------------------

/// Snapshot of the legacy tables the bridge touches.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub users: BTreeMap<u32, TapirUser>,
    pub nicknames: HashMap<u32, String>,
    pub sessions: Vec<TapirSession>,
    pub tokens: Vec<TapirEmailChangeToken>,
    pub used_tokens: Vec<(u32, String, TokenUsage)>,
    pub audit: Vec<NewAdminAudit>,
}

/// Legacy store whose transactions work on a private snapshot and publish
/// it on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
    transient_failures: Arc<AtomicUsize>,
    fatal_failures: Arc<AtomicUsize>,
    flag_writes: Arc<Mutex<Vec<(u32, TapirUserFlag, i64)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: TapirUser) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .nicknames
                .insert(user.user_id, format!("user{}", user.user_id));
            state.users.insert(user.user_id, user);
        }
        self
    }

    pub fn with_session(self, session: TapirSession) -> Self {
        self.state.lock().unwrap().sessions.push(session);
        self
    }

    pub fn with_token(self, token: TapirEmailChangeToken) -> Self {
        self.state.lock().unwrap().tokens.push(token);
        self
    }

    /// The next `n` user lookups fail with a retryable error.
    pub fn fail_transiently(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` user lookups fail with a non-retryable error.
    pub fn fail_fatally(&self, n: usize) {
        self.fatal_failures.store(n, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }

    pub fn user(&self, user_id: u32) -> Option<TapirUser> {
        self.snapshot().users.get(&user_id).cloned()
    }

    pub fn audit_rows(&self) -> Vec<NewAdminAudit> {
        self.snapshot().audit
    }

    /// Committed audit rows read back the way reports read them.
    pub fn audit_history(&self) -> Vec<HistoryEntry> {
        self.audit_rows()
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                HistoryEntry::from_record(TapirAdminAudit {
                    entry_id: index as u32 + 1,
                    log_date: row.log_date,
                    session_id: row.session_id,
                    ip_addr: row.ip_addr,
                    remote_host: row.remote_host,
                    admin_user: Some(row.admin_user),
                    affected_user: row.affected_user,
                    tracking_cookie: row.tracking_cookie,
                    action: row.action,
                    data: row.data,
                    comment: row.comment,
                })
            })
            .collect()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Committed flag transitions.
    pub fn flag_writes(&self) -> Vec<(u32, TapirUserFlag, i64)> {
        self.flag_writes.lock().unwrap().clone()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl LegacyStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LegacyTx>, DbError> {
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            working: self.snapshot(),
            flag_writes: Vec::new(),
        }))
    }
}

pub struct MemoryTx {
    store: MemoryStore,
    working: MemoryState,
    flag_writes: Vec<(u32, TapirUserFlag, i64)>,
}

#[async_trait]
impl LegacyTx for MemoryTx {
    async fn find_user(&mut self, user_id: u32) -> Result<Option<TapirUser>, DbError> {
        if take_one(&self.store.transient_failures) {
            return Err(DbError::ConnectionFailed(sqlx::Error::PoolTimedOut));
        }
        if take_one(&self.store.fatal_failures) {
            return Err(DbError::ValidationFailed("corrupt row".to_string()));
        }
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn set_user_flag(
        &mut self,
        user_id: u32,
        flag: TapirUserFlag,
        value: i64,
    ) -> Result<bool, DbError> {
        let Some(user) = self.working.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if user.flag(flag) == value {
            return Ok(false);
        }
        user.set_flag_value(flag, value);
        self.flag_writes.push((user_id, flag, value));
        Ok(true)
    }

    async fn set_user_email(&mut self, user_id: u32, email: &str) -> Result<bool, DbError> {
        let Some(user) = self.working.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if user.email == email {
            return Ok(false);
        }
        user.email = email.to_string();
        Ok(true)
    }

    async fn find_profile(&mut self, user_id: u32) -> Result<Option<UserProfile>, DbError> {
        let Some(user) = self.working.users.get(&user_id) else {
            return Ok(None);
        };
        Ok(Some(UserProfile {
            username: self.working.nicknames.get(&user_id).cloned(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }))
    }

    async fn update_profile(&mut self, user_id: u32, profile: &UserProfile) -> Result<bool, DbError> {
        let Some(user) = self.working.users.get_mut(&user_id) else {
            return Err(DbError::NotFound(format!("tapir_users.user_id={user_id}")));
        };
        let mut changed = false;
        if let Some(first) = &profile.first_name {
            changed |= user.first_name.as_ref() != Some(first);
            user.first_name = Some(first.clone());
        }
        if let Some(last) = &profile.last_name {
            changed |= user.last_name.as_ref() != Some(last);
            user.last_name = Some(last.clone());
        }
        if let Some(username) = &profile.username {
            let previous = self.working.nicknames.insert(user_id, username.clone());
            changed |= previous.as_ref() != Some(username);
        }
        Ok(changed)
    }

    async fn latest_session(&mut self, user_id: u32) -> Result<Option<TapirSession>, DbError> {
        Ok(self
            .working
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .max_by_key(|s| s.session_id)
            .cloned())
    }

    async fn latest_unused_email_change(
        &mut self,
        user_id: u32,
        new_email: Option<&str>,
    ) -> Result<Option<TapirEmailChangeToken>, DbError> {
        Ok(self
            .working
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.used == 0)
            .filter(|t| new_email.is_none() || t.new_email.as_deref() == new_email)
            .max_by_key(|t| t.issued_when)
            .cloned())
    }

    async fn mark_email_change_used(
        &mut self,
        token: &TapirEmailChangeToken,
        usage: &TokenUsage,
    ) -> Result<bool, DbError> {
        let Some(stored) = self
            .working
            .tokens
            .iter_mut()
            .find(|t| t.user_id == token.user_id && t.secret == token.secret && t.used == 0)
        else {
            return Ok(false);
        };
        stored.used = 1;
        self.working
            .used_tokens
            .push((token.user_id, token.secret.clone(), usage.clone()));
        Ok(true)
    }

    async fn insert_admin_audit(&mut self, event: &AdminAuditEvent) -> Result<u64, AuditError> {
        self.working.audit.push(event.to_record());
        Ok(self.working.audit.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        let this = *self;
        *this.store.state.lock().unwrap() = this.working;
        this.store
            .flag_writes
            .lock()
            .unwrap()
            .extend(this.flag_writes);
        this.store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.store.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - for inspecting forwarded requests
// ---------------------------------------------------------------------------

/// A captured forwarded request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    pub fn body_json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("forwarded body is JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Responds with a fixed status and records every request.
#[derive(Clone)]
pub struct CaptureResponder {
    status: u16,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl CaptureResponder {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().unwrap().clone()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let headers = request
            .headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_lowercase(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        self.captured.lock().unwrap().push(CapturedRequest {
            body: request.body.clone(),
            headers,
        });
        ResponseTemplate::new(self.status)
    }
}
