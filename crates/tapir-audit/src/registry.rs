//! Static action and flag tables.
//!
//! Every action tag maps to exactly one constructor and one decoder. The
//! match in [`action_entry`] is exhaustive, so adding an action kind
//! without wiring its codec fails to compile.

use crate::action::AuditActionKind;
use crate::error::AuditError;
use crate::event::{fields, grammar, AuditPayload, Endorsement, FlagSetting, PayloadFields};
use crate::status::{FlagValueType, UserFlag};

/// Builds a payload from loose keyword fields.
pub type ConstructFn = fn(&PayloadFields) -> Result<AuditPayload, AuditError>;

/// Parses a payload from the stored `data` column.
pub type DecodeFn = fn(&str) -> Result<AuditPayload, AuditError>;

/// Codec pair for one action kind.
#[derive(Clone, Copy)]
pub struct ActionEntry {
    pub kind: AuditActionKind,
    pub construct: ConstructFn,
    pub decode: DecodeFn,
}

impl std::fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEntry").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Set-flag family entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagEntry {
    pub flag: UserFlag,
    pub value_name: &'static str,
    pub value_type: FlagValueType,
}

/// Codec pair for `kind`.
#[must_use]
pub fn action_entry(kind: AuditActionKind) -> ActionEntry {
    use AuditActionKind as K;

    let (construct, decode): (ConstructFn, DecodeFn) = match kind {
        K::AddComment => (
            |_| Ok(AuditPayload::AddComment),
            |d| grammar::empty(K::AddComment, d).map(|()| AuditPayload::AddComment),
        ),
        K::AddPaperOwner => (
            |f| {
                let paper_id = fields::paper_id(K::AddPaperOwner, f)?;
                Ok(AuditPayload::AddPaperOwner { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::AddPaperOwner, d)?;
                Ok(AuditPayload::AddPaperOwner { paper_id })
            },
        ),
        K::AddPaperOwner2 => (
            |f| {
                let paper_id = fields::paper_id(K::AddPaperOwner2, f)?;
                Ok(AuditPayload::AddPaperOwner2 { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::AddPaperOwner2, d)?;
                Ok(AuditPayload::AddPaperOwner2 { paper_id })
            },
        ),
        K::ArxivChangePaperPw => (
            |f| {
                let paper_id = fields::paper_id(K::ArxivChangePaperPw, f)?;
                Ok(AuditPayload::ArxivChangePaperPw { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::ArxivChangePaperPw, d)?;
                Ok(AuditPayload::ArxivChangePaperPw { paper_id })
            },
        ),
        K::ArxivChangeStatus => (
            |f| {
                Ok(AuditPayload::ArxivChangeStatus {
                    before: fields::status("status_before", &f.status_before)?,
                    after: fields::status("status_after", &f.status_after)?,
                })
            },
            |d| {
                let (before, after) = grammar::status_change(d)?;
                Ok(AuditPayload::ArxivChangeStatus { before, after })
            },
        ),
        K::ArxivMakeAuthor => (
            |f| {
                let paper_id = fields::paper_id(K::ArxivMakeAuthor, f)?;
                Ok(AuditPayload::ArxivMakeAuthor { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::ArxivMakeAuthor, d)?;
                Ok(AuditPayload::ArxivMakeAuthor { paper_id })
            },
        ),
        K::ArxivMakeNonauthor => (
            |f| {
                let paper_id = fields::paper_id(K::ArxivMakeNonauthor, f)?;
                Ok(AuditPayload::ArxivMakeNonauthor { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::ArxivMakeNonauthor, d)?;
                Ok(AuditPayload::ArxivMakeNonauthor { paper_id })
            },
        ),
        K::ArxivRevokePaperOwner => (
            |f| {
                let paper_id = fields::paper_id(K::ArxivRevokePaperOwner, f)?;
                Ok(AuditPayload::ArxivRevokePaperOwner { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::ArxivRevokePaperOwner, d)?;
                Ok(AuditPayload::ArxivRevokePaperOwner { paper_id })
            },
        ),
        K::ArxivUnrevokePaperOwner => (
            |f| {
                let paper_id = fields::paper_id(K::ArxivUnrevokePaperOwner, f)?;
                Ok(AuditPayload::ArxivUnrevokePaperOwner { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::ArxivUnrevokePaperOwner, d)?;
                Ok(AuditPayload::ArxivUnrevokePaperOwner { paper_id })
            },
        ),
        K::BecomeUser => (
            |f| Ok(AuditPayload::BecomeUser { new_session_id: fields::new_session_id(f)? }),
            |d| Ok(AuditPayload::BecomeUser { new_session_id: grammar::new_session_id(d)? }),
        ),
        K::ChangeEmail => (
            |f| {
                let email = fields::non_empty(K::ChangeEmail, "email", &f.email)?;
                Ok(AuditPayload::ChangeEmail { email })
            },
            |d| {
                let email = grammar::non_empty(K::ChangeEmail, d)?;
                Ok(AuditPayload::ChangeEmail { email })
            },
        ),
        K::ChangePaperPw => (
            |f| {
                let paper_id = fields::paper_id(K::ChangePaperPw, f)?;
                Ok(AuditPayload::ChangePaperPw { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::ChangePaperPw, d)?;
                Ok(AuditPayload::ChangePaperPw { paper_id })
            },
        ),
        K::ChangePassword => (
            |_| Ok(AuditPayload::ChangePassword),
            |d| grammar::empty(K::ChangePassword, d).map(|()| AuditPayload::ChangePassword),
        ),
        K::EndorsedBySuspect => (
            |f| fields::endorsement(K::EndorsedBySuspect, f).map(AuditPayload::EndorsedBySuspect),
            |d| Endorsement::decode(K::EndorsedBySuspect, d).map(AuditPayload::EndorsedBySuspect),
        ),
        K::FlipFlag => (
            |f| fields::flag_setting(f).map(AuditPayload::FlipFlag),
            |d| FlagSetting::decode(d).map(AuditPayload::FlipFlag),
        ),
        K::GotNegativeEndorsement => (
            |f| {
                fields::endorsement(K::GotNegativeEndorsement, f)
                    .map(AuditPayload::GotNegativeEndorsement)
            },
            |d| {
                Endorsement::decode(K::GotNegativeEndorsement, d)
                    .map(AuditPayload::GotNegativeEndorsement)
            },
        ),
        K::MakeModerator => (
            |f| {
                let category = fields::non_empty(K::MakeModerator, "category", &f.category)?;
                Ok(AuditPayload::MakeModerator { category })
            },
            |d| {
                let category = grammar::non_empty(K::MakeModerator, d)?;
                Ok(AuditPayload::MakeModerator { category })
            },
        ),
        K::RevokePaperOwner => (
            |f| {
                let paper_id = fields::paper_id(K::RevokePaperOwner, f)?;
                Ok(AuditPayload::RevokePaperOwner { paper_id })
            },
            |d| {
                let paper_id = grammar::paper_id(K::RevokePaperOwner, d)?;
                Ok(AuditPayload::RevokePaperOwner { paper_id })
            },
        ),
        K::SuspendUser => (
            |_| Ok(AuditPayload::SuspendUser),
            |d| grammar::banned(K::SuspendUser, d, true).map(|()| AuditPayload::SuspendUser),
        ),
        K::UnmakeModerator => (
            |f| {
                let category = fields::non_empty(K::UnmakeModerator, "category", &f.category)?;
                Ok(AuditPayload::UnmakeModerator { category })
            },
            |d| {
                let category = grammar::non_empty(K::UnmakeModerator, d)?;
                Ok(AuditPayload::UnmakeModerator { category })
            },
        ),
        K::UnsuspendUser => (
            |_| Ok(AuditPayload::UnsuspendUser),
            |d| grammar::banned(K::UnsuspendUser, d, false).map(|()| AuditPayload::UnsuspendUser),
        ),
    };

    ActionEntry {
        kind,
        construct,
        decode,
    }
}

/// Look up a set-flag identifier such as `tapir_users.flag_banned`.
pub fn flag_entry(identifier: &str) -> Result<FlagEntry, AuditError> {
    let flag = identifier.parse::<UserFlag>()?;
    Ok(FlagEntry {
        flag,
        value_name: flag.value_name(),
        value_type: flag.value_type(),
    })
}

/// Build a payload for the action named by `tag`.
pub fn construct_by_action(tag: &str, fields: &PayloadFields) -> Result<AuditPayload, AuditError> {
    let kind = tag.parse::<AuditActionKind>()?;
    (action_entry(kind).construct)(fields)
}

/// Decode `data` under the grammar of the action named by `tag`.
pub fn decode_by_action(tag: &str, data: &str) -> Result<AuditPayload, AuditError> {
    let kind = tag.parse::<AuditActionKind>()?;
    (action_entry(kind).decode)(data)
}
