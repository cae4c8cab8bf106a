//! # tapir-db
//!
//! Row models and queries for the legacy "tapir" user store.
//!
//! The schema is owned elsewhere; this crate only reads and writes the
//! columns the identity bridge and the admin audit trail need. Every query
//! takes an executor so callers decide the transaction boundary.

pub mod error;
pub mod models;

pub use error::DbError;
pub use models::{
    NewAdminAudit, TapirAdminAudit, TapirEmailChangeToken, TapirNickname, TapirSession,
    TapirUser, TapirUserFlag, TokenUsage,
};

/// Connection pool type used by every caller of this crate.
pub type DbPool = sqlx::MySqlPool;
