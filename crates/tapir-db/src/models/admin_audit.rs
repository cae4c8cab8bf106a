//! Admin audit row model (`tapir_admin_audit`).
//!
//! Records every administrative action taken against a user account.
//! Rows are append-only: nothing here updates or deletes an entry.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlExecutor};

use super::clip;

/// Column width of `ip_addr`.
pub const IP_ADDR_MAX: usize = 16;
/// Column width of `remote_host` and `tracking_cookie`.
pub const REMOTE_HOST_MAX: usize = 255;
/// Column width of `action`.
pub const ACTION_MAX: usize = 32;

/// A persisted admin audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TapirAdminAudit {
    /// Auto-increment primary key.
    pub entry_id: u32,
    /// Epoch seconds.
    pub log_date: i64,
    pub session_id: Option<u32>,
    pub ip_addr: String,
    pub remote_host: String,
    /// Nullable in the legacy schema.
    pub admin_user: Option<u32>,
    pub affected_user: u32,
    pub tracking_cookie: String,
    /// Action tag, one of the audit action kinds.
    pub action: String,
    /// Action-specific payload.
    pub data: String,
    pub comment: String,
}

/// Input for appending an audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdminAudit {
    pub log_date: i64,
    pub session_id: Option<u32>,
    pub ip_addr: String,
    pub remote_host: String,
    pub admin_user: u32,
    pub affected_user: u32,
    pub tracking_cookie: String,
    pub action: String,
    pub data: String,
    pub comment: String,
}

const SELECT_COLUMNS: &str = r"
    SELECT entry_id, CAST(log_date AS SIGNED) AS log_date, session_id, ip_addr, remote_host,
           admin_user, affected_user, tracking_cookie, action, data, comment
    FROM tapir_admin_audit
";

impl TapirAdminAudit {
    /// Append an audit entry and return its `entry_id`.
    ///
    /// String columns are clipped to their declared widths.
    pub async fn create<'e, E>(executor: E, input: &NewAdminAudit) -> Result<u64, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            INSERT INTO tapir_admin_audit
                (log_date, session_id, ip_addr, remote_host, admin_user, affected_user,
                 tracking_cookie, action, data, comment)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(input.log_date)
        .bind(input.session_id)
        .bind(clip(&input.ip_addr, IP_ADDR_MAX))
        .bind(clip(&input.remote_host, REMOTE_HOST_MAX))
        .bind(input.admin_user)
        .bind(input.affected_user)
        .bind(clip(&input.tracking_cookie, REMOTE_HOST_MAX))
        .bind(clip(&input.action, ACTION_MAX))
        .bind(&input.data)
        .bind(&input.comment)
        .execute(executor)
        .await?;

        Ok(result.last_insert_id())
    }

    /// Get an audit entry by its primary key.
    pub async fn get_by_id<'e, E>(executor: E, entry_id: u32) -> Result<Option<Self>, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        let query = format!("{SELECT_COLUMNS} WHERE entry_id = ?");
        sqlx::query_as::<_, Self>(&query)
            .bind(entry_id)
            .fetch_optional(executor)
            .await
    }

    /// List the audit trail of one affected user, oldest first.
    pub async fn list_for_affected_user<'e, E>(
        executor: E,
        affected_user: u32,
        limit: u32,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: MySqlExecutor<'e>,
    {
        let query = format!(
            "{SELECT_COLUMNS} WHERE affected_user = ? ORDER BY log_date ASC, entry_id ASC LIMIT ?"
        );
        sqlx::query_as::<_, Self>(&query)
            .bind(affected_user)
            .bind(limit)
            .fetch_all(executor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_widths_match_schema() {
        assert_eq!(IP_ADDR_MAX, 16);
        assert_eq!(REMOTE_HOST_MAX, 255);
        assert_eq!(ACTION_MAX, 32);
    }

    #[test]
    fn test_select_columns_cast_log_date() {
        assert!(SELECT_COLUMNS.contains("CAST(log_date AS SIGNED) AS log_date"));
    }
}
