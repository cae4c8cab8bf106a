//! Realm role mapping changes mapped onto `tapir_users` flag columns.

use async_trait::async_trait;
use serde_json::Value;
use tapir_db::TapirUserFlag;
use tracing::{debug, info, warn};

use super::{audit_flag_transition, parse_user_id};
use crate::envelope::IdentityEvent;
use crate::error::BridgeError;
use crate::handler::{ChangeSet, Handler, HandlerContext, Outcome};
use crate::store::LegacyTx;

/// Legacy flag column backing a realm role, if the role is mirrored.
pub fn role_flag(role_name: &str) -> Option<TapirUserFlag> {
    match role_name {
        "AllowTexProduced" => Some(TapirUserFlag::FlagAllowTexProduced),
        "Owner" => Some(TapirUserFlag::FlagEditSystem),
        "Administrator" => Some(TapirUserFlag::FlagEditUsers),
        "Approved" => Some(TapirUserFlag::FlagApproved),
        "Banned" => Some(TapirUserFlag::FlagBanned),
        "CanLock" => Some(TapirUserFlag::FlagCanLock),
        _ => None,
    }
}

/// First `name` found in a role representation, searching nested lists.
pub fn find_role_name(representation: &Value) -> Option<&str> {
    match representation {
        Value::Array(items) => items.iter().find_map(find_role_name),
        Value::Object(map) => map.get("name").and_then(Value::as_str),
        _ => None,
    }
}

/// `realm_role_mapping` create (grant) and delete (revoke).
#[derive(Debug, Clone, Copy)]
pub struct RoleMappingHandler {
    grant: bool,
}

impl RoleMappingHandler {
    pub fn create() -> Self {
        Self { grant: true }
    }

    pub fn delete() -> Self {
        Self { grant: false }
    }

    fn value(&self) -> i64 {
        i64::from(self.grant)
    }

    async fn apply(
        &self,
        ctx: &HandlerContext,
        event: &IdentityEvent,
        representation: &Value,
        tx: &mut dyn LegacyTx,
    ) -> Result<Outcome, BridgeError> {
        let Some(raw_id) = event.subject_user_id() else {
            warn!(event_id = event.event_id(), "Unable to find user id in resource path");
            return Ok(Outcome::not_found("no user id in resource path"));
        };
        let Some(user_id) = parse_user_id(raw_id) else {
            warn!(event_id = event.event_id(), user = raw_id, "User id is not a legacy id");
            return Ok(Outcome::not_found(format!("user {raw_id}")));
        };
        let Some(mut user) = tx.find_user(user_id).await? else {
            warn!(event_id = event.event_id(), user_id, "User not found in tapir_users");
            return Ok(Outcome::not_found(format!("user {user_id}")));
        };

        let Value::Array(role_changes) = representation else {
            warn!(
                event_id = event.event_id(),
                user_id,
                "Unexpected role mapping payload: {representation}"
            );
            return Ok(Outcome::irrelevant("role mapping payload is not a list"));
        };

        let value = self.value();
        let mut changes = ChangeSet::new();
        for role_change in role_changes {
            let Some(role_name) = find_role_name(role_change) else {
                warn!(user_id, "Unable to find role name in {role_change}");
                continue;
            };
            let Some(flag) = role_flag(role_name) else {
                debug!(user_id, role = role_name, "Role is not mirrored to tapir");
                continue;
            };

            let current = user.flag(flag);
            if current == value {
                debug!(user_id, role = role_name, field = %flag, value, "Role unchanged");
                continue;
            }
            if !tx.set_user_flag(user_id, flag, value).await? {
                debug!(user_id, field = %flag, "Flag already written by another writer");
                continue;
            }
            user.set_flag_value(flag, value);
            info!(user_id, role = role_name, field = %flag, value, "Role flag changed");
            changes.push(user_id, flag.column(), current, value);

            if let Some(entry_id) =
                audit_flag_transition(ctx, event, tx, user_id, flag, value).await?
            {
                changes.audit_entries.push(entry_id);
            }
        }

        Ok(Outcome::Applied(changes))
    }
}

#[async_trait]
impl Handler for RoleMappingHandler {
    fn name(&self) -> &'static str {
        if self.grant {
            "dispatch_realm_role_mapping_do_create"
        } else {
            "dispatch_realm_role_mapping_do_delete"
        }
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        event: &IdentityEvent,
        representation: &Value,
        tx: &mut dyn LegacyTx,
    ) -> Outcome {
        self.apply(ctx, event, representation, tx)
            .await
            .unwrap_or_else(Outcome::from_error)
    }
}
