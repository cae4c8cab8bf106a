//! Legacy user model (`tapir_users`).

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlExecutor};

/// Boolean-ish flag columns on `tapir_users` that the bridge maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapirUserFlag {
    FlagEditUsers,
    FlagEditSystem,
    FlagApproved,
    FlagBanned,
    FlagCanLock,
    FlagAllowTexProduced,
    FlagEmailVerified,
}

impl TapirUserFlag {
    /// Column name in `tapir_users`.
    ///
    /// Only these static names are ever interpolated into SQL.
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Self::FlagEditUsers => "flag_edit_users",
            Self::FlagEditSystem => "flag_edit_system",
            Self::FlagApproved => "flag_approved",
            Self::FlagBanned => "flag_banned",
            Self::FlagCanLock => "flag_can_lock",
            Self::FlagAllowTexProduced => "flag_allow_tex_produced",
            Self::FlagEmailVerified => "flag_email_verified",
        }
    }
}

impl std::fmt::Display for TapirUserFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// A legacy user row, restricted to the columns the bridge reads.
///
/// Flag columns are `int unsigned` in the schema and are cast to signed
/// integers on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TapirUser {
    pub user_id: u32,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub flag_edit_users: i64,
    pub flag_edit_system: i64,
    pub flag_approved: i64,
    pub flag_banned: i64,
    pub flag_can_lock: i64,
    pub flag_allow_tex_produced: i64,
    pub flag_email_verified: i64,
}

impl TapirUser {
    /// Current value of a flag column.
    #[must_use]
    pub fn flag(&self, flag: TapirUserFlag) -> i64 {
        match flag {
            TapirUserFlag::FlagEditUsers => self.flag_edit_users,
            TapirUserFlag::FlagEditSystem => self.flag_edit_system,
            TapirUserFlag::FlagApproved => self.flag_approved,
            TapirUserFlag::FlagBanned => self.flag_banned,
            TapirUserFlag::FlagCanLock => self.flag_can_lock,
            TapirUserFlag::FlagAllowTexProduced => self.flag_allow_tex_produced,
            TapirUserFlag::FlagEmailVerified => self.flag_email_verified,
        }
    }

    /// Set a flag on the in-memory row.
    pub fn set_flag_value(&mut self, flag: TapirUserFlag, value: i64) {
        let slot = match flag {
            TapirUserFlag::FlagEditUsers => &mut self.flag_edit_users,
            TapirUserFlag::FlagEditSystem => &mut self.flag_edit_system,
            TapirUserFlag::FlagApproved => &mut self.flag_approved,
            TapirUserFlag::FlagBanned => &mut self.flag_banned,
            TapirUserFlag::FlagCanLock => &mut self.flag_can_lock,
            TapirUserFlag::FlagAllowTexProduced => &mut self.flag_allow_tex_produced,
            TapirUserFlag::FlagEmailVerified => &mut self.flag_email_verified,
        };
        *slot = value;
    }

    /// Find a user by id.
    pub async fn find_by_id<'e, E>(executor: E, user_id: u32) -> Result<Option<Self>, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r"
            SELECT user_id, first_name, last_name, email,
                   CAST(flag_edit_users AS SIGNED) AS flag_edit_users,
                   CAST(flag_edit_system AS SIGNED) AS flag_edit_system,
                   CAST(flag_approved AS SIGNED) AS flag_approved,
                   CAST(flag_banned AS SIGNED) AS flag_banned,
                   CAST(flag_can_lock AS SIGNED) AS flag_can_lock,
                   CAST(flag_allow_tex_produced AS SIGNED) AS flag_allow_tex_produced,
                   CAST(flag_email_verified AS SIGNED) AS flag_email_verified
            FROM tapir_users
            WHERE user_id = ?
            ",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Write a flag only if it differs from `value`.
    ///
    /// Returns true when a row actually changed.
    pub async fn set_flag<'e, E>(
        executor: E,
        user_id: u32,
        flag: TapirUserFlag,
        value: i64,
    ) -> Result<bool, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        let column = flag.column();
        let query =
            format!("UPDATE tapir_users SET {column} = ? WHERE user_id = ? AND {column} <> ?");
        let result = sqlx::query(&query)
            .bind(value)
            .bind(user_id)
            .bind(value)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write first/last name only where they differ.
    pub async fn set_names<'e, E>(
        executor: E,
        user_id: u32,
        first_name: &str,
        last_name: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            UPDATE tapir_users SET first_name = ?, last_name = ?
            WHERE user_id = ? AND (first_name <> ? OR last_name <> ?
                                   OR first_name IS NULL OR last_name IS NULL)
            ",
        )
        .bind(first_name)
        .bind(last_name)
        .bind(user_id)
        .bind(first_name)
        .bind(last_name)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the email address if it differs.
    pub async fn set_email<'e, E>(executor: E, user_id: u32, email: &str) -> Result<bool, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        let result =
            sqlx::query("UPDATE tapir_users SET email = ? WHERE user_id = ? AND email <> ?")
                .bind(email)
                .bind(user_id)
                .bind(email)
                .execute(executor)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
