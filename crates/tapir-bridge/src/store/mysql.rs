//! MySQL implementation of the legacy store.

use async_trait::async_trait;
use sqlx::{MySql, Transaction};
use tapir_audit::{AdminAuditEvent, AuditError, AuditSink};
use tapir_db::{
    DbError, DbPool, TapirEmailChangeToken, TapirNickname, TapirSession, TapirUser,
    TapirUserFlag,
};
use tracing::debug;

use super::{LegacyStore, LegacyTx, TokenUsage, UserProfile};

/// Legacy store backed by a MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlLegacyStore {
    pool: DbPool,
}

impl MySqlLegacyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl LegacyStore for MySqlLegacyStore {
    async fn begin(&self) -> Result<Box<dyn LegacyTx>, DbError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlLegacyTx { tx }))
    }
}

struct MySqlLegacyTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl LegacyTx for MySqlLegacyTx {
    async fn find_user(&mut self, user_id: u32) -> Result<Option<TapirUser>, DbError> {
        Ok(TapirUser::find_by_id(&mut *self.tx, user_id).await?)
    }

    async fn set_user_flag(
        &mut self,
        user_id: u32,
        flag: TapirUserFlag,
        value: i64,
    ) -> Result<bool, DbError> {
        Ok(TapirUser::set_flag(&mut *self.tx, user_id, flag, value).await?)
    }

    async fn set_user_email(&mut self, user_id: u32, email: &str) -> Result<bool, DbError> {
        Ok(TapirUser::set_email(&mut *self.tx, user_id, email).await?)
    }

    async fn find_profile(&mut self, user_id: u32) -> Result<Option<UserProfile>, DbError> {
        let Some(user) = TapirUser::find_by_id(&mut *self.tx, user_id).await? else {
            return Ok(None);
        };
        let nickname = TapirNickname::primary_for_user(&mut *self.tx, user_id).await?;
        Ok(Some(UserProfile {
            username: nickname.map(|n| n.nickname),
            first_name: user.first_name,
            last_name: user.last_name,
        }))
    }

    async fn update_profile(&mut self, user_id: u32, profile: &UserProfile) -> Result<bool, DbError> {
        let mut changed = false;

        if profile.first_name.is_some() || profile.last_name.is_some() {
            let Some(user) = TapirUser::find_by_id(&mut *self.tx, user_id).await? else {
                return Err(DbError::NotFound(format!("tapir_users.user_id={user_id}")));
            };
            let first = profile
                .first_name
                .clone()
                .or(user.first_name)
                .unwrap_or_default();
            let last = profile
                .last_name
                .clone()
                .or(user.last_name)
                .unwrap_or_default();
            changed |= TapirUser::set_names(&mut *self.tx, user_id, &first, &last).await?;
        }

        if let Some(username) = &profile.username {
            changed |= TapirNickname::rename_primary(&mut *self.tx, user_id, username).await?;
        }

        debug!(user_id, changed, "Profile update applied");
        Ok(changed)
    }

    async fn latest_session(&mut self, user_id: u32) -> Result<Option<TapirSession>, DbError> {
        Ok(TapirSession::latest_for_user(&mut *self.tx, user_id).await?)
    }

    async fn latest_unused_email_change(
        &mut self,
        user_id: u32,
        new_email: Option<&str>,
    ) -> Result<Option<TapirEmailChangeToken>, DbError> {
        Ok(TapirEmailChangeToken::latest_unused(&mut *self.tx, user_id, new_email).await?)
    }

    async fn mark_email_change_used(
        &mut self,
        token: &TapirEmailChangeToken,
        usage: &TokenUsage,
    ) -> Result<bool, DbError> {
        Ok(TapirEmailChangeToken::mark_used(&mut self.tx, token, usage).await?)
    }

    async fn insert_admin_audit(&mut self, event: &AdminAuditEvent) -> Result<u64, AuditError> {
        AuditSink::record(&mut *self.tx, event).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
