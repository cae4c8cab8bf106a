//! Audit sink: persists events to `tapir_admin_audit` and reads them back.

use sqlx::MySqlExecutor;
use tapir_db::TapirAdminAudit;
use tracing::{debug, warn};

use crate::error::AuditError;
use crate::event::AdminAuditEvent;

/// Default page size for [`AuditSink::history_for_user`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 500;

/// A decoded audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub entry_id: u32,
    pub event: AdminAuditEvent,
}

impl AuditEntry {
    /// Decode a stored row strictly.
    pub fn from_record(record: &TapirAdminAudit) -> Result<Self, AuditError> {
        Ok(Self {
            entry_id: record.entry_id,
            event: AdminAuditEvent::from_record(record)?,
        })
    }
}

/// One row of a user's audit history.
///
/// Rows that fail to decode are kept with their error so reports can show
/// them instead of hiding them.
#[derive(Debug)]
pub struct HistoryEntry {
    pub record: TapirAdminAudit,
    pub decoded: Result<AdminAuditEvent, AuditError>,
}

impl HistoryEntry {
    /// Decode `record`, keeping it alongside the error when it is corrupt.
    pub fn from_record(record: TapirAdminAudit) -> Self {
        let decoded = AdminAuditEvent::from_record(&record);
        if let Err(err) = &decoded {
            warn!(
                entry_id = record.entry_id,
                action = %record.action,
                error = %err,
                "Corrupt admin audit row"
            );
        }
        Self { record, decoded }
    }

    pub fn is_corrupt(&self) -> bool {
        self.decoded.is_err()
    }
}

/// Append-only writer and reader of the admin audit trail.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditSink;

impl AuditSink {
    /// Append `event` and return the new `entry_id`.
    pub async fn record<'e, E>(executor: E, event: &AdminAuditEvent) -> Result<u64, AuditError>
    where
        E: MySqlExecutor<'e>,
    {
        let row = event.to_record();
        let entry_id = TapirAdminAudit::create(executor, &row).await?;
        debug!(
            entry_id,
            action = %row.action,
            admin_user = row.admin_user,
            affected_user = row.affected_user,
            "Admin audit entry recorded"
        );
        Ok(entry_id)
    }

    /// Load and decode one entry. A corrupt row is an error.
    pub async fn load<'e, E>(executor: E, entry_id: u32) -> Result<Option<AuditEntry>, AuditError>
    where
        E: MySqlExecutor<'e>,
    {
        match TapirAdminAudit::get_by_id(executor, entry_id).await? {
            Some(record) => AuditEntry::from_record(&record).map(Some),
            None => Ok(None),
        }
    }

    /// Audit history of `affected_user`, oldest first.
    pub async fn history_for_user<'e, E>(
        executor: E,
        affected_user: u32,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, AuditError>
    where
        E: MySqlExecutor<'e>,
    {
        let records = TapirAdminAudit::list_for_affected_user(executor, affected_user, limit).await?;
        Ok(records.into_iter().map(HistoryEntry::from_record).collect())
    }
}
