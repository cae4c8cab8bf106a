//! Error types for the tapir-audit crate.

use tapir_db::DbError;
use thiserror::Error;

/// Errors raised while constructing, decoding or persisting audit events.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The stored `data` does not match the grammar of its action.
    #[error("data '{data}' is not valid for {action}: {reason}")]
    Decode {
        action: String,
        data: String,
        reason: String,
    },

    /// Action tag is not part of the audit vocabulary.
    #[error("{tag} is not a valid admin action")]
    UnknownAction { tag: String },

    /// Flag identifier is not part of the set-flag family.
    #[error("{flag} is not a valid admin action of flip-flag")]
    UnknownFlag { flag: String },

    /// A required field was missing or unusable at construction time.
    #[error("cannot construct {action}: field '{field}' {reason}")]
    Construction {
        action: String,
        field: String,
        reason: String,
    },

    /// Persisting or loading an audit row failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl AuditError {
    pub(crate) fn decode(action: impl ToString, data: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            action: action.to_string(),
            data: data.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn construction(
        action: impl ToString,
        field: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Construction {
            action: action.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(action: impl ToString, field: &str) -> Self {
        Self::construction(action, field, "is required")
    }

    /// Returns true for errors caused by a corrupt or unknown stored row.
    pub fn is_corrupt_row(&self) -> bool {
        matches!(
            self,
            AuditError::Decode { .. } | AuditError::UnknownAction { .. } | AuditError::UnknownFlag { .. }
        )
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        AuditError::Database(DbError::from(err))
    }
}
