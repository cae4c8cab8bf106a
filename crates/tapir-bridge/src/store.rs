//! Legacy store seam.
//!
//! Handlers see the legacy database only through [`LegacyTx`], one
//! transaction per message. Nothing a handler writes is visible until the
//! bridge commits.

pub mod mysql;

use async_trait::async_trait;
use tapir_audit::{AdminAuditEvent, AuditError};
use tapir_db::{DbError, TapirEmailChangeToken, TapirSession, TapirUser, TapirUserFlag};

pub use tapir_db::TokenUsage;

/// Name fields of a legacy user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    /// Primary nickname.
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Opens per-message transactions on the legacy store.
#[async_trait]
pub trait LegacyStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LegacyTx>, DbError>;
}

/// Operations available to handlers inside one transaction.
#[async_trait]
pub trait LegacyTx: Send {
    async fn find_user(&mut self, user_id: u32) -> Result<Option<TapirUser>, DbError>;

    /// Guarded flag write; returns true only when the stored value changed.
    async fn set_user_flag(
        &mut self,
        user_id: u32,
        flag: TapirUserFlag,
        value: i64,
    ) -> Result<bool, DbError>;

    /// Guarded email write; returns true only when the stored value changed.
    async fn set_user_email(&mut self, user_id: u32, email: &str) -> Result<bool, DbError>;

    async fn find_profile(&mut self, user_id: u32) -> Result<Option<UserProfile>, DbError>;

    /// Write the given profile fields; `None` leaves a field untouched.
    async fn update_profile(&mut self, user_id: u32, profile: &UserProfile) -> Result<bool, DbError>;

    async fn latest_session(&mut self, user_id: u32) -> Result<Option<TapirSession>, DbError>;

    async fn latest_unused_email_change(
        &mut self,
        user_id: u32,
        new_email: Option<&str>,
    ) -> Result<Option<TapirEmailChangeToken>, DbError>;

    /// Consume a pending token. Returns false if it was already used.
    async fn mark_email_change_used(
        &mut self,
        token: &TapirEmailChangeToken,
        usage: &TokenUsage,
    ) -> Result<bool, DbError>;

    /// Append an admin audit row and return its `entry_id`.
    async fn insert_admin_audit(&mut self, event: &AdminAuditEvent) -> Result<u64, AuditError>;

    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}
