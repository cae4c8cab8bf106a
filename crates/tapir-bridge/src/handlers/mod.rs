//! Handlers for the identity events the legacy store cares about.

pub mod authn;
pub mod role_mapping;
pub mod user_profile;
pub mod verify_email;

pub use authn::SessionObserver;
pub use role_mapping::RoleMappingHandler;
pub use user_profile::UserProfileHandler;
pub use verify_email::VerifyEmailHandler;

use tapir_audit::{AdminAuditEvent, AuditEnvelope, AuditPayload, FlagSetting, UserFlag};
use tapir_db::TapirUserFlag;
use tracing::debug;

use crate::envelope::IdentityEvent;
use crate::error::BridgeError;
use crate::handler::HandlerContext;
use crate::store::LegacyTx;

/// Legacy user ids are unsigned integers.
pub(crate) fn parse_user_id(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

/// Audit flag recorded for a `tapir_users` column, if the column belongs
/// to the set-flag vocabulary.
pub(crate) fn audited_flag(flag: TapirUserFlag) -> Option<UserFlag> {
    match flag {
        TapirUserFlag::FlagEditUsers => Some(UserFlag::EditUsers),
        TapirUserFlag::FlagEditSystem => Some(UserFlag::EditSystem),
        TapirUserFlag::FlagBanned => Some(UserFlag::Banned),
        TapirUserFlag::FlagEmailVerified => Some(UserFlag::EmailVerified),
        TapirUserFlag::FlagApproved
        | TapirUserFlag::FlagCanLock
        | TapirUserFlag::FlagAllowTexProduced => None,
    }
}

/// Append a `flip-flag` audit row for a flag transition that was just
/// written. Returns the new `entry_id`, or `None` when the column is not
/// audited or no acting admin is known.
pub(crate) async fn audit_flag_transition(
    ctx: &HandlerContext,
    event: &IdentityEvent,
    tx: &mut dyn LegacyTx,
    user_id: u32,
    flag: TapirUserFlag,
    value: i64,
) -> Result<Option<u64>, BridgeError> {
    let Some(audit_flag) = audited_flag(flag) else {
        return Ok(None);
    };
    let admin = event
        .actor_user_id()
        .and_then(parse_user_id)
        .or(ctx.audit_admin_user);
    let Some(admin) = admin else {
        debug!(
            event_id = event.event_id(),
            user_id,
            flag = %flag,
            "No acting admin for audit row, skipping"
        );
        return Ok(None);
    };

    let mut envelope = AuditEnvelope::new(admin, user_id)
        .with_timestamp(ctx.timestamp)
        .with_comment(format!("identity event {}", event.event_id()));
    let remote_ip = event
        .auth_details
        .as_ref()
        .and_then(|a| a.ip_address.as_deref())
        .or(event.ip_address.as_deref());
    if let Some(ip) = remote_ip {
        envelope = envelope.with_remote_ip(ip);
    }

    let setting = FlagSetting::new(audit_flag, value)?;
    let audit = AdminAuditEvent::new(envelope, AuditPayload::FlipFlag(setting));
    let entry_id = tx.insert_admin_audit(&audit).await?;
    debug!(entry_id, user_id, data = %audit.data(), "Flag transition audited");
    Ok(Some(entry_id))
}
