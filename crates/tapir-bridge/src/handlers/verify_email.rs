//! `VERIFY_EMAIL` session events consume a pending email change.

use async_trait::async_trait;
use serde_json::Value;
use tapir_db::TapirUserFlag;
use tracing::{debug, info, warn};

use super::parse_user_id;
use crate::envelope::IdentityEvent;
use crate::error::BridgeError;
use crate::handler::{ChangeSet, Handler, HandlerContext, Outcome};
use crate::store::{LegacyTx, TokenUsage};

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyEmailHandler;

impl VerifyEmailHandler {
    async fn apply(
        &self,
        ctx: &HandlerContext,
        event: &IdentityEvent,
        tx: &mut dyn LegacyTx,
    ) -> Result<Outcome, BridgeError> {
        let Some(user_id) = event.user_id.as_deref().and_then(parse_user_id) else {
            warn!(event_id = event.event_id(), "Email verification without legacy user id");
            return Ok(Outcome::not_found("no legacy user id"));
        };
        let Some(user) = tx.find_user(user_id).await? else {
            warn!(event_id = event.event_id(), user_id, "User not found in tapir_users");
            return Ok(Outcome::not_found(format!("user {user_id}")));
        };
        let Some(session) = tx.latest_session(user_id).await? else {
            warn!(event_id = event.event_id(), user_id, "No legacy session for user");
            return Ok(Outcome::not_found(format!("session of user {user_id}")));
        };

        let new_email = event.detail("email");
        let Some(token) = tx.latest_unused_email_change(user_id, new_email).await? else {
            debug!(user_id, "No pending email change");
            return Ok(Outcome::Applied(ChangeSet::new()));
        };

        let usage = TokenUsage {
            used_when: event.time.map_or(ctx.timestamp, |ms| ms / 1000),
            remote_ip: event.ip_address.clone().unwrap_or_default(),
            remote_host: String::new(),
            session_id: session.session_id,
        };
        if !tx.mark_email_change_used(&token, &usage).await? {
            debug!(user_id, "Pending email change already consumed");
            return Ok(Outcome::Applied(ChangeSet::new()));
        }

        let mut changes = ChangeSet::new();
        changes.push(user_id, "email_change_token", "unused", "used");
        info!(
            user_id,
            session_id = session.session_id,
            used_when = usage.used_when,
            "Email change token consumed"
        );

        let flag = TapirUserFlag::FlagEmailVerified;
        let current = user.flag(flag);
        if current != 1 && tx.set_user_flag(user_id, flag, 1).await? {
            info!(user_id, field = %flag, "Email marked verified");
            changes.push(user_id, flag.column(), current, 1);
        }

        if let Some(email) = token.new_email.as_deref() {
            if email != user.email && tx.set_user_email(user_id, email).await? {
                info!(user_id, from = %user.email, to = email, "Email changed");
                changes.push(user_id, "email", &user.email, email);
            }
        }

        Ok(Outcome::Applied(changes))
    }
}

#[async_trait]
impl Handler for VerifyEmailHandler {
    fn name(&self) -> &'static str {
        "dispatch_authn_do_verify_email"
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        event: &IdentityEvent,
        _representation: &Value,
        tx: &mut dyn LegacyTx,
    ) -> Outcome {
        self.apply(ctx, event, tx)
            .await
            .unwrap_or_else(Outcome::from_error)
    }
}
