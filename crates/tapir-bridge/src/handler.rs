//! Handler contract and outcome types.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tapir_audit::AuditError;
use tapir_db::DbError;

use crate::envelope::IdentityEvent;
use crate::error::BridgeError;
use crate::store::LegacyTx;

/// Per-message context shared with handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerContext {
    /// Fallback acting admin for audit rows.
    pub audit_admin_user: Option<u32>,
    /// Epoch seconds at which the message is processed.
    pub timestamp: i64,
}

impl HandlerContext {
    pub fn now(audit_admin_user: Option<u32>) -> Self {
        Self {
            audit_admin_user,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// One legacy field transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub user_id: u32,
    pub field: String,
    pub from: String,
    pub to: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {} {}: {} -> {}",
            self.user_id, self.field, self.from, self.to
        )
    }
}

/// What a handler wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
    /// `entry_id`s of audit rows appended in the same transaction.
    pub audit_entries: Vec<u64>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the event was already reflected in the legacy store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.audit_entries.is_empty()
    }

    pub fn push(
        &mut self,
        user_id: u32,
        field: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) {
        self.changes.push(Change {
            user_id,
            field: field.into(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The referenced identity does not exist in the legacy store.
    NotFound(String),
    /// Nothing in the event applies to the legacy store.
    Irrelevant(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Redelivery may succeed.
    Transient(String),
    /// Redelivery will fail the same way.
    Fatal(String),
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(ChangeSet),
    Skipped(SkipReason),
    Failed(FailureKind),
}

impl Outcome {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Skipped(SkipReason::NotFound(what.into()))
    }

    pub fn irrelevant(why: impl Into<String>) -> Self {
        Self::Skipped(SkipReason::Irrelevant(why.into()))
    }

    /// Classify an error raised while applying an event.
    ///
    /// A missing row is a skip, not a failure.
    pub fn from_error(err: BridgeError) -> Self {
        if let BridgeError::Database(DbError::NotFound(what))
        | BridgeError::Audit(AuditError::Database(DbError::NotFound(what))) = err
        {
            return Self::not_found(what);
        }
        if err.is_transient() {
            Self::Failed(FailureKind::Transient(err.to_string()))
        } else {
            Self::Failed(FailureKind::Fatal(err.to_string()))
        }
    }
}

/// Applies one kind of identity event to the legacy store.
///
/// Implementations compare the desired state against what is stored and
/// write only differences, so a redelivered event is a no-op.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Conventional name, e.g. `dispatch_user_do_update`.
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &HandlerContext,
        event: &IdentityEvent,
        representation: &Value,
        tx: &mut dyn LegacyTx,
    ) -> Outcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_classification() {
        let transient = BridgeError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(
            Outcome::from_error(transient),
            Outcome::Failed(FailureKind::Transient(_))
        ));

        let fatal = BridgeError::Database(DbError::ValidationFailed("bad".to_string()));
        assert!(matches!(
            Outcome::from_error(fatal),
            Outcome::Failed(FailureKind::Fatal(_))
        ));
    }

    #[test]
    fn test_from_error_not_found_is_skip() {
        let missing = BridgeError::Database(DbError::NotFound("tapir_users 42".to_string()));
        assert_eq!(
            Outcome::from_error(missing),
            Outcome::Skipped(SkipReason::NotFound("tapir_users 42".to_string()))
        );

        let via_audit =
            BridgeError::Audit(AuditError::Database(DbError::NotFound("entry 9".to_string())));
        assert_eq!(Outcome::from_error(via_audit), Outcome::not_found("entry 9"));
    }

    #[test]
    fn test_change_set() {
        let mut changes = ChangeSet::new();
        assert!(changes.is_empty());
        changes.push(42, "flag_edit_users", 0, 1);
        assert!(!changes.is_empty());
        assert_eq!(changes.changes[0].to_string(), "user 42 flag_edit_users: 0 -> 1");
    }
}
