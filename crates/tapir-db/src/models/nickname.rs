//! Legacy nickname model (`tapir_nicknames`).
//!
//! A user's login name is the nickname flagged primary.

use sqlx::{FromRow, MySqlExecutor};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TapirNickname {
    pub nick_id: u32,
    pub nickname: String,
    pub user_id: u32,
}

impl TapirNickname {
    /// The primary nickname of a user, if any.
    pub async fn primary_for_user<'e, E>(
        executor: E,
        user_id: u32,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r"
            SELECT nick_id, nickname, user_id
            FROM tapir_nicknames
            WHERE user_id = ? AND flag_primary = 1
            LIMIT 1
            ",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Rename the primary nickname. Returns true when a row changed.
    pub async fn rename_primary<'e, E>(
        executor: E,
        user_id: u32,
        nickname: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            UPDATE tapir_nicknames SET nickname = ?
            WHERE user_id = ? AND flag_primary = 1 AND nickname <> ?
            ",
        )
        .bind(nickname)
        .bind(user_id)
        .bind(nickname)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
