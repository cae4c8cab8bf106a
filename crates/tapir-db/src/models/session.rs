//! Legacy session model (`tapir_sessions`).

use sqlx::{FromRow, MySqlExecutor};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TapirSession {
    pub session_id: u32,
    pub user_id: u32,
    pub start_time: i64,
    pub end_time: i64,
}

impl TapirSession {
    /// The most recent session of a user (highest session id).
    pub async fn latest_for_user<'e, E>(
        executor: E,
        user_id: u32,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r"
            SELECT session_id, user_id,
                   CAST(start_time AS SIGNED) AS start_time,
                   CAST(end_time AS SIGNED) AS end_time
            FROM tapir_sessions
            WHERE user_id = ?
            ORDER BY session_id DESC
            LIMIT 1
            ",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }
}
