//! Human-readable rendering of audit events.
//!
//! Rendering never fails: unknown users fall back to `user #<id>` and
//! rows that do not decode fall back to their raw tokens.

use std::collections::HashMap;

use tapir_db::TapirAdminAudit;

use crate::event::{AdminAuditEvent, AuditPayload, FlagValue};

/// Resolves user ids to display names.
pub trait UserLookup {
    fn display_name(&self, user_id: u32) -> Option<String>;
}

impl UserLookup for HashMap<u32, String> {
    fn display_name(&self, user_id: u32) -> Option<String> {
        self.get(&user_id).cloned()
    }
}

fn name_of(lookup: &dyn UserLookup, user_id: u32) -> String {
    lookup
        .display_name(user_id)
        .unwrap_or_else(|| format!("user #{user_id}"))
}

/// One sentence describing `event`.
pub fn describe(event: &AdminAuditEvent, lookup: &dyn UserLookup) -> String {
    let admin = name_of(lookup, event.envelope.admin_user_id);
    let user = name_of(lookup, event.envelope.affected_user_id);

    let sentence = match &event.payload {
        AuditPayload::AddComment => format!("{admin} commented on {user}"),
        AuditPayload::AddPaperOwner { paper_id } | AuditPayload::AddPaperOwner2 { paper_id } => {
            format!("{admin} made {user} an owner of paper {paper_id}")
        }
        AuditPayload::ArxivChangePaperPw { paper_id } | AuditPayload::ChangePaperPw { paper_id } => {
            format!("{admin} changed the password of paper {paper_id} for {user}")
        }
        AuditPayload::ArxivChangeStatus { before, after } => {
            format!("{admin} changed the status of {user} from {before} to {after}")
        }
        AuditPayload::ArxivMakeAuthor { paper_id } => {
            format!("{admin} made {user} an author of paper {paper_id}")
        }
        AuditPayload::ArxivMakeNonauthor { paper_id } => {
            format!("{admin} made {user} a non-author of paper {paper_id}")
        }
        AuditPayload::ArxivRevokePaperOwner { paper_id }
        | AuditPayload::RevokePaperOwner { paper_id } => {
            format!("{admin} revoked ownership of paper {paper_id} from {user}")
        }
        AuditPayload::ArxivUnrevokePaperOwner { paper_id } => {
            format!("{admin} restored ownership of paper {paper_id} to {user}")
        }
        AuditPayload::BecomeUser { new_session_id } => {
            format!("{admin} became {user} in session {new_session_id}")
        }
        AuditPayload::ChangeEmail { email } => {
            format!("{admin} changed the email of {user} to {email}")
        }
        AuditPayload::ChangePassword => format!("{admin} changed the password of {user}"),
        AuditPayload::EndorsedBySuspect(e) => format!(
            "{user} was endorsed for {} by suspect user #{} (endorsee #{})",
            e.category, e.endorser, e.endorsee
        ),
        AuditPayload::GotNegativeEndorsement(e) => format!(
            "{user} got a negative endorsement for {} from user #{} (endorsee #{})",
            e.category, e.endorser, e.endorsee
        ),
        AuditPayload::FlipFlag(setting) => match setting.value {
            FlagValue::Bool(true) => format!("{admin} set {} on {user}", setting.flag),
            FlagValue::Bool(false) => format!("{admin} cleared {} on {user}", setting.flag),
            FlagValue::Int(n) => format!("{admin} set {} to {n} on {user}", setting.flag),
        },
        AuditPayload::MakeModerator { category } => {
            format!("{admin} made {user} a moderator of {category}")
        }
        AuditPayload::UnmakeModerator { category } => {
            format!("{admin} removed {user} as moderator of {category}")
        }
        AuditPayload::SuspendUser => format!("{admin} suspended {user}"),
        AuditPayload::UnsuspendUser => format!("{admin} unsuspended {user}"),
    };

    match event.envelope.comment.as_deref() {
        Some(comment) if !comment.is_empty() => format!("{sentence}: {comment}"),
        _ => sentence,
    }
}

/// Describe a stored row, falling back to its raw tokens when it does not
/// decode.
pub fn describe_record(record: &TapirAdminAudit, lookup: &dyn UserLookup) -> String {
    match AdminAuditEvent::from_record(record) {
        Ok(event) => describe(&event, lookup),
        Err(err) => {
            tracing::debug!(
                entry_id = record.entry_id,
                action = %record.action,
                error = %err,
                "Audit row does not decode, rendering raw tokens"
            );
            let admin = record
                .admin_user
                .map_or_else(|| "unknown admin".to_string(), |id| name_of(lookup, id));
            let user = name_of(lookup, record.affected_user);
            let tokens: Vec<&str> = record.data.split(' ').collect();
            format!("{admin} performed {} on {user} with {tokens:?}", record.action)
        }
    }
}
