//! Email change token model (`tapir_email_change_tokens` and
//! `tapir_email_change_tokens_used`).
//!
//! A token is issued when a user asks to change their address and is
//! consumed once the new address is verified. Consumption is recorded
//! twice: on the token row itself and as a row in the `_used` table.

use sqlx::{FromRow, MySqlConnection, MySqlExecutor};

use super::admin_audit::{IP_ADDR_MAX, REMOTE_HOST_MAX};
use super::clip;

/// A pending or consumed email change token.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TapirEmailChangeToken {
    pub user_id: u32,
    pub old_email: Option<String>,
    pub new_email: Option<String>,
    pub secret: String,
    /// Epoch seconds.
    pub issued_when: i64,
    /// 0 = unused, 1 = used.
    pub used: i64,
    pub session_id: Option<u32>,
}

/// Where and when a token was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUsage {
    /// Epoch seconds.
    pub used_when: i64,
    pub remote_ip: String,
    pub remote_host: String,
    pub session_id: u32,
}

impl TapirEmailChangeToken {
    /// The most recently issued unused token of a user.
    ///
    /// When `new_email` is given only tokens for that address match.
    pub async fn latest_unused<'e, E>(
        executor: E,
        user_id: u32,
        new_email: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r"
            SELECT user_id, old_email, new_email, secret,
                   CAST(issued_when AS SIGNED) AS issued_when,
                   CAST(used AS SIGNED) AS used,
                   session_id
            FROM tapir_email_change_tokens
            WHERE user_id = ? AND used = 0 AND (? IS NULL OR new_email = ?)
            ORDER BY issued_when DESC
            LIMIT 1
            ",
        )
        .bind(user_id)
        .bind(new_email)
        .bind(new_email)
        .fetch_optional(executor)
        .await
    }

    /// Mark a token consumed and record the usage row.
    ///
    /// The token update only applies while `used = 0`; returns false (and
    /// writes nothing) when another writer already consumed it.
    pub async fn mark_used(
        conn: &mut MySqlConnection,
        token: &Self,
        usage: &TokenUsage,
    ) -> Result<bool, sqlx::Error> {
        let remote_ip = clip(&usage.remote_ip, IP_ADDR_MAX);
        let remote_host = clip(&usage.remote_host, REMOTE_HOST_MAX);

        let updated = sqlx::query(
            r"
            UPDATE tapir_email_change_tokens
            SET used = 1, consumed_when = ?, consumed_from = ?, remote_host = ?
            WHERE user_id = ? AND secret = ? AND used = 0
            ",
        )
        .bind(usage.used_when)
        .bind(remote_ip)
        .bind(remote_host)
        .bind(token.user_id)
        .bind(&token.secret)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r"
            INSERT INTO tapir_email_change_tokens_used
                (user_id, secret, used_when, used_from, remote_host, session_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(token.user_id)
        .bind(&token.secret)
        .bind(usage.used_when)
        .bind(remote_ip)
        .bind(remote_host)
        .bind(usage.session_id)
        .execute(&mut *conn)
        .await?;

        Ok(true)
    }
}
