//! User updates: names, login name and the email-verified flag.

use async_trait::async_trait;
use serde_json::Value;
use tapir_db::TapirUserFlag;
use tracing::{debug, info, warn};

use super::{audit_flag_transition, parse_user_id};
use crate::envelope::IdentityEvent;
use crate::error::BridgeError;
use crate::handler::{ChangeSet, Handler, HandlerContext, Outcome};
use crate::store::{LegacyTx, UserProfile};

/// `user` update.
///
/// Name fields go through the profile; `emailVerified` is written straight
/// to the flag column since it comes from a different part of the
/// representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserProfileHandler;

fn representation_user_id(representation: &Value) -> Option<String> {
    match representation.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field<'a>(representation: &'a Value, key: &str) -> Option<&'a str> {
    representation.get(key).and_then(Value::as_str)
}

/// The desired value when it differs from `current`.
fn changed_field(desired: Option<&str>, current: Option<&str>) -> Option<String> {
    let desired = desired?;
    (Some(desired) != current).then(|| desired.to_string())
}

impl UserProfileHandler {
    async fn apply(
        &self,
        ctx: &HandlerContext,
        event: &IdentityEvent,
        representation: &Value,
        tx: &mut dyn LegacyTx,
    ) -> Result<Outcome, BridgeError> {
        let raw_id = representation_user_id(representation)
            .or_else(|| event.subject_user_id().map(str::to_string));
        let Some(raw_id) = raw_id else {
            warn!(event_id = event.event_id(), "User update without user id");
            return Ok(Outcome::not_found("no user id in user update"));
        };
        let Some(user_id) = parse_user_id(&raw_id) else {
            warn!(event_id = event.event_id(), user = %raw_id, "User id is not a legacy id");
            return Ok(Outcome::not_found(format!("user {raw_id}")));
        };
        let Some(user) = tx.find_user(user_id).await? else {
            warn!(event_id = event.event_id(), user_id, "User not found in tapir_users");
            return Ok(Outcome::not_found(format!("user {user_id}")));
        };

        let mut changes = ChangeSet::new();

        if let Some(verified) = representation.get("emailVerified").and_then(Value::as_bool) {
            let flag = TapirUserFlag::FlagEmailVerified;
            let value = i64::from(verified);
            let current = user.flag(flag);
            if current == value {
                debug!(user_id, field = %flag, value, "Email verified unchanged");
            } else if tx.set_user_flag(user_id, flag, value).await? {
                info!(user_id, field = %flag, value, "Email verified changed");
                changes.push(user_id, flag.column(), current, value);
                if let Some(entry_id) =
                    audit_flag_transition(ctx, event, tx, user_id, flag, value).await?
                {
                    changes.audit_entries.push(entry_id);
                }
            }
        }

        let Some(current) = tx.find_profile(user_id).await? else {
            return Ok(Outcome::not_found(format!("profile of user {user_id}")));
        };
        let desired = UserProfile {
            username: changed_field(
                text_field(representation, "username"),
                current.username.as_deref(),
            ),
            first_name: changed_field(
                text_field(representation, "firstName"),
                current.first_name.as_deref(),
            ),
            last_name: changed_field(
                text_field(representation, "lastName"),
                current.last_name.as_deref(),
            ),
        };

        if desired == UserProfile::default() {
            debug!(user_id, "Profile unchanged");
            return Ok(Outcome::Applied(changes));
        }

        if tx.update_profile(user_id, &desired).await? {
            let fields = [
                ("username", &current.username, &desired.username),
                ("first_name", &current.first_name, &desired.first_name),
                ("last_name", &current.last_name, &desired.last_name),
            ];
            for (field, from, to) in fields {
                if let Some(to) = to {
                    let from = from.as_deref().unwrap_or("");
                    info!(user_id, field, from, to = %to, "Profile field changed");
                    changes.push(user_id, field, from, to);
                }
            }
        }

        Ok(Outcome::Applied(changes))
    }
}

#[async_trait]
impl Handler for UserProfileHandler {
    fn name(&self) -> &'static str {
        "dispatch_user_do_update"
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
