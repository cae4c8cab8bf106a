//! # tapir-audit
//!
//! Typed codec for the legacy admin audit trail.
//!
//! Each administrative action is an [`AdminAuditEvent`]: a shared
//! [`AuditEnvelope`] plus one [`AuditPayload`] variant. Payloads are packed
//! into the single `data` column of `tapir_admin_audit` with a per-action
//! grammar, and decoding is strict: a row whose `data` does not parse under
//! its own action fails with [`AuditError::Decode`].
//!
//! ## Example
//!
//! ```rust
//! use tapir_audit::{decode_by_action, AdminAuditEvent, AuditEnvelope, AuditPayload};
//! use tapir_audit::{FlagSetting, UserFlag};
//!
//! let setting = FlagSetting::new(UserFlag::Banned, "yes").unwrap();
//! let event = AdminAuditEvent::new(AuditEnvelope::new(1, 42), AuditPayload::FlipFlag(setting));
//! assert_eq!(event.data(), "tapir_users.flag_banned=1");
//!
//! let payload = decode_by_action(event.action().as_str(), &event.data()).unwrap();
//! assert_eq!(payload, event.payload);
//! ```

pub mod action;
pub mod describe;
pub mod error;
pub mod event;
pub mod registry;
pub mod sink;
pub mod status;

pub use action::AuditActionKind;
pub use describe::{describe, describe_record, UserLookup};
pub use error::AuditError;
pub use event::{
    AdminAuditEvent, AuditEnvelope, AuditPayload, Endorsement, FlagInput, FlagSetting, FlagValue,
    PayloadFields,
};
pub use registry::{action_entry, construct_by_action, decode_by_action, flag_entry};
pub use sink::{AuditEntry, AuditSink, HistoryEntry};
pub use status::{FlagValueType, UserFlag, VetoStatus};
