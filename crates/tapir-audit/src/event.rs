//! Typed admin audit events and their `data` column grammars.
//!
//! An [`AdminAuditEvent`] is an [`AuditEnvelope`] (who, when, from where)
//! plus an [`AuditPayload`] (what). Each payload variant packs its fields
//! into the single `data` string with its own grammar:
//!
//! | Action family | `data` |
//! |---|---|
//! | paper reference | `<paper_id>` |
//! | `become-user` | `<new_session_id>` (integer) |
//! | `change-email` | `<email>` |
//! | `flip-flag` | `<table.column>=<value>` |
//! | endorsements | `<endorser> <category> <endorsee>` |
//! | moderator | `<category>` |
//! | `arXiv-change-status` | `<before> -> <after>` |
//! | suspend / unsuspend | `tapir_users.flag_banned=1` / `=0` |
//! | `add-comment`, `change-password` | empty |

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tapir_db::{NewAdminAudit, TapirAdminAudit};

use crate::action::AuditActionKind;
use crate::error::AuditError;
use crate::registry;
use crate::status::{FlagValueType, UserFlag, VetoStatus};

static USER_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+$").expect("USER_ID_PATTERN is a valid regex pattern")
});

static CATEGORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w\-]+\..*$").expect("CATEGORY_PATTERN is a valid regex pattern")
});

const STATUS_SEPARATOR: &str = " -> ";

/// Fields shared by every audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEnvelope {
    /// Epoch seconds.
    pub timestamp: i64,
    pub admin_user_id: u32,
    pub affected_user_id: u32,
    pub session_id: Option<u32>,
    pub remote_ip: Option<String>,
    pub remote_hostname: Option<String>,
    pub tracking_cookie: Option<String>,
    pub comment: Option<String>,
}

impl AuditEnvelope {
    /// Envelope stamped with the current time.
    pub fn new(admin_user_id: u32, affected_user_id: u32) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            admin_user_id,
            affected_user_id,
            session_id: None,
            remote_ip: None,
            remote_hostname: None,
            tracking_cookie: None,
            comment: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_session_id(mut self, session_id: u32) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_remote_ip(mut self, remote_ip: impl Into<String>) -> Self {
        self.remote_ip = non_blank_owned(remote_ip.into());
        self
    }

    pub fn with_remote_hostname(mut self, remote_hostname: impl Into<String>) -> Self {
        self.remote_hostname = non_blank_owned(remote_hostname.into());
        self
    }

    pub fn with_tracking_cookie(mut self, tracking_cookie: impl Into<String>) -> Self {
        self.tracking_cookie = non_blank_owned(tracking_cookie.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = non_blank_owned(comment.into());
        self
    }
}

/// Raw value handed to a set-flag constructor before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagInput {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for FlagInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FlagInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FlagInput {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FlagInput {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for FlagInput {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Normalised set-flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("1"),
            Self::Bool(false) => f.write_str("0"),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

/// A `flip-flag` payload: one flag and its new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSetting {
    pub flag: UserFlag,
    pub value: FlagValue,
}

impl FlagSetting {
    /// Normalise `input` against the flag's declared type.
    ///
    /// Boolean flags accept `yes`/`true`/`1` and `no`/`false`/`0` (any
    /// case), the integers 1 and 0, or a bool. Integer flags accept an
    /// integer or its decimal text.
    pub fn new(flag: UserFlag, input: impl Into<FlagInput>) -> Result<Self, AuditError> {
        let input = input.into();
        let reject = |reason: String| {
            AuditError::construction(AuditActionKind::FlipFlag, flag.value_name(), reason)
        };

        let value = match flag.value_type() {
            FlagValueType::Bool => match &input {
                FlagInput::Bool(b) => FlagValue::Bool(*b),
                FlagInput::Int(1) => FlagValue::Bool(true),
                FlagInput::Int(0) => FlagValue::Bool(false),
                FlagInput::Int(n) => return Err(reject(format!("{n} is not a boolean value"))),
                FlagInput::Text(s) => match s.to_ascii_lowercase().as_str() {
                    "yes" | "true" | "1" => FlagValue::Bool(true),
                    "no" | "false" | "0" => FlagValue::Bool(false),
                    _ => return Err(reject(format!("'{s}' is not a boolean value"))),
                },
            },
            FlagValueType::Int => match &input {
                FlagInput::Int(n) => FlagValue::Int(*n),
                FlagInput::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(FlagValue::Int)
                    .map_err(|_| reject(format!("'{s}' is not an integer")))?,
                FlagInput::Bool(b) => return Err(reject(format!("{b} is not an integer"))),
            },
        };

        Ok(Self { flag, value })
    }

    /// `<flag>=<value>`.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}={}", self.flag.as_str(), self.value)
    }

    /// Parse `<flag>=<value>`. Exactly one `=` is allowed and boolean
    /// values must be `0` or `1`.
    pub fn decode(data: &str) -> Result<Self, AuditError> {
        let action = AuditActionKind::FlipFlag;
        let parts: Vec<&str> = data.split('=').collect();
        let [identifier, raw_value] = parts.as_slice() else {
            return Err(AuditError::decode(action, data, "is not a valid flag=value"));
        };

        let flag = registry::flag_entry(identifier)?.flag;
        let value = match flag.value_type() {
            FlagValueType::Bool => match *raw_value {
                "1" => FlagValue::Bool(true),
                "0" => FlagValue::Bool(false),
                _ => return Err(AuditError::decode(action, data, "boolean value must be 0 or 1")),
            },
            FlagValueType::Int => raw_value
                .parse::<i64>()
                .map(FlagValue::Int)
                .map_err(|_| AuditError::decode(action, data, "value is not an integer"))?,
        };

        Ok(Self { flag, value })
    }
}

/// Endorsement payload: `<endorser> <category> <endorsee>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub endorser: String,
    pub category: String,
    pub endorsee: String,
}

impl Endorsement {
    pub fn new(
        action: AuditActionKind,
        endorser: impl Into<String>,
        category: impl Into<String>,
        endorsee: impl Into<String>,
    ) -> Result<Self, AuditError> {
        let endorsement = Self {
            endorser: endorser.into(),
            category: category.into(),
            endorsee: endorsee.into(),
        };
        if let Some((field, reason)) = endorsement.invalid_field() {
            return Err(AuditError::construction(action, field, reason));
        }
        Ok(endorsement)
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!("{} {} {}", self.endorser, self.category, self.endorsee)
    }

    pub fn decode(action: AuditActionKind, data: &str) -> Result<Self, AuditError> {
        let tokens: Vec<&str> = data.split(' ').collect();
        let [endorser, category, endorsee] = tokens.as_slice() else {
            return Err(AuditError::decode(action, data, "expected 3 space-separated tokens"));
        };
        let endorsement = Self {
            endorser: (*endorser).to_string(),
            category: (*category).to_string(),
            endorsee: (*endorsee).to_string(),
        };
        if let Some((field, reason)) = endorsement.invalid_field() {
            return Err(AuditError::decode(action, data, format!("{field} {reason}")));
        }
        Ok(endorsement)
    }

    fn invalid_field(&self) -> Option<(&'static str, &'static str)> {
        if !USER_ID_PATTERN.is_match(&self.endorser) {
            return Some(("endorser", "is not a numeric user id"));
        }
        if !USER_ID_PATTERN.is_match(&self.endorsee) {
            return Some(("endorsee", "is not a numeric user id"));
        }
        if self.category.contains(char::is_whitespace) || !CATEGORY_PATTERN.is_match(&self.category)
        {
            return Some(("category", "is not an archive.subject category"));
        }
        None
    }
}

/// Action-specific payload of an audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditPayload {
    AddComment,
    AddPaperOwner { paper_id: String },
    AddPaperOwner2 { paper_id: String },
    ArxivChangePaperPw { paper_id: String },
    ArxivChangeStatus { before: VetoStatus, after: VetoStatus },
    ArxivMakeAuthor { paper_id: String },
    ArxivMakeNonauthor { paper_id: String },
    ArxivRevokePaperOwner { paper_id: String },
    ArxivUnrevokePaperOwner { paper_id: String },
    BecomeUser { new_session_id: i64 },
    ChangeEmail { email: String },
    ChangePaperPw { paper_id: String },
    ChangePassword,
    EndorsedBySuspect(Endorsement),
    FlipFlag(FlagSetting),
    GotNegativeEndorsement(Endorsement),
    MakeModerator { category: String },
    RevokePaperOwner { paper_id: String },
    SuspendUser,
    UnmakeModerator { category: String },
    UnsuspendUser,
}

impl AuditPayload {
    #[must_use]
    pub fn kind(&self) -> AuditActionKind {
        match self {
            Self::AddComment => AuditActionKind::AddComment,
            Self::AddPaperOwner { .. } => AuditActionKind::AddPaperOwner,
            Self::AddPaperOwner2 { .. } => AuditActionKind::AddPaperOwner2,
            Self::ArxivChangePaperPw { .. } => AuditActionKind::ArxivChangePaperPw,
            Self::ArxivChangeStatus { .. } => AuditActionKind::ArxivChangeStatus,
            Self::ArxivMakeAuthor { .. } => AuditActionKind::ArxivMakeAuthor,
            Self::ArxivMakeNonauthor { .. } => AuditActionKind::ArxivMakeNonauthor,
            Self::ArxivRevokePaperOwner { .. } => AuditActionKind::ArxivRevokePaperOwner,
            Self::ArxivUnrevokePaperOwner { .. } => AuditActionKind::ArxivUnrevokePaperOwner,
            Self::BecomeUser { .. } => AuditActionKind::BecomeUser,
            Self::ChangeEmail { .. } => AuditActionKind::ChangeEmail,
            Self::ChangePaperPw { .. } => AuditActionKind::ChangePaperPw,
            Self::ChangePassword => AuditActionKind::ChangePassword,
            Self::EndorsedBySuspect(_) => AuditActionKind::EndorsedBySuspect,
            Self::FlipFlag(_) => AuditActionKind::FlipFlag,
            Self::GotNegativeEndorsement(_) => AuditActionKind::GotNegativeEndorsement,
            Self::MakeModerator { .. } => AuditActionKind::MakeModerator,
            Self::RevokePaperOwner { .. } => AuditActionKind::RevokePaperOwner,
            Self::SuspendUser => AuditActionKind::SuspendUser,
            Self::UnmakeModerator { .. } => AuditActionKind::UnmakeModerator,
            Self::UnsuspendUser => AuditActionKind::UnsuspendUser,
        }
    }

    /// Render the `data` column.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::AddComment | Self::ChangePassword => String::new(),
            Self::AddPaperOwner { paper_id }
            | Self::AddPaperOwner2 { paper_id }
            | Self::ArxivChangePaperPw { paper_id }
            | Self::ArxivMakeAuthor { paper_id }
            | Self::ArxivMakeNonauthor { paper_id }
            | Self::ArxivRevokePaperOwner { paper_id }
            | Self::ArxivUnrevokePaperOwner { paper_id }
            | Self::ChangePaperPw { paper_id }
            | Self::RevokePaperOwner { paper_id } => paper_id.clone(),
            Self::ArxivChangeStatus { before, after } => {
                format!("{before}{STATUS_SEPARATOR}{after}")
            }
            Self::BecomeUser { new_session_id } => new_session_id.to_string(),
            Self::ChangeEmail { email } => email.clone(),
            Self::EndorsedBySuspect(e) | Self::GotNegativeEndorsement(e) => e.encode(),
            Self::FlipFlag(setting) => setting.encode(),
            Self::MakeModerator { category } | Self::UnmakeModerator { category } => {
                category.clone()
            }
            Self::SuspendUser => banned_setting(true).encode(),
            Self::UnsuspendUser => banned_setting(false).encode(),
        }
    }

    /// Paper identifier for paper-reference actions.
    #[must_use]
    pub fn paper_id(&self) -> Option<&str> {
        match self {
            Self::AddPaperOwner { paper_id }
            | Self::AddPaperOwner2 { paper_id }
            | Self::ArxivChangePaperPw { paper_id }
            | Self::ArxivMakeAuthor { paper_id }
            | Self::ArxivMakeNonauthor { paper_id }
            | Self::ArxivRevokePaperOwner { paper_id }
            | Self::ArxivUnrevokePaperOwner { paper_id }
            | Self::ChangePaperPw { paper_id }
            | Self::RevokePaperOwner { paper_id } => Some(paper_id),
            _ => None,
        }
    }
}

pub(crate) fn banned_setting(banned: bool) -> FlagSetting {
    FlagSetting {
        flag: UserFlag::Banned,
        value: FlagValue::Bool(banned),
    }
}

/// Loose keyword fields for building a payload by action tag.
///
/// Only the fields the chosen action needs are read; a missing one is a
/// construction error naming the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadFields {
    pub paper_id: Option<String>,
    pub new_session_id: Option<String>,
    pub email: Option<String>,
    pub flag: Option<String>,
    pub value: Option<FlagInput>,
    pub endorser: Option<String>,
    pub category: Option<String>,
    pub endorsee: Option<String>,
    pub status_before: Option<String>,
    pub status_after: Option<String>,
}

impl PayloadFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paper_id(mut self, paper_id: impl Into<String>) -> Self {
        self.paper_id = Some(paper_id.into());
        self
    }

    pub fn new_session_id(mut self, new_session_id: impl ToString) -> Self {
        self.new_session_id = Some(new_session_id.to_string());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn flag(mut self, flag: impl Into<String>, value: impl Into<FlagInput>) -> Self {
        self.flag = Some(flag.into());
        self.value = Some(value.into());
        self
    }

    pub fn endorsement(
        mut self,
        endorser: impl Into<String>,
        category: impl Into<String>,
        endorsee: impl Into<String>,
    ) -> Self {
        self.endorser = Some(endorser.into());
        self.category = Some(category.into());
        self.endorsee = Some(endorsee.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn status_change(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.status_before = Some(before.into());
        self.status_after = Some(after.into());
        self
    }
}

/// Field accessors used by the registry constructors.
pub(crate) mod fields {
    use super::*;

    pub fn required<'a>(
        action: AuditActionKind,
        name: &str,
        value: &'a Option<String>,
    ) -> Result<&'a str, AuditError> {
        value.as_deref().ok_or_else(|| AuditError::missing(action, name))
    }

    pub fn paper_id(action: AuditActionKind, f: &PayloadFields) -> Result<String, AuditError> {
        let paper_id = required(action, "paper_id", &f.paper_id)?;
        check_paper_id(paper_id)
            .map_err(|reason| AuditError::construction(action, "paper_id", reason))?;
        Ok(paper_id.to_string())
    }

    pub fn new_session_id(f: &PayloadFields) -> Result<i64, AuditError> {
        let action = AuditActionKind::BecomeUser;
        let raw = required(action, "new_session_id", &f.new_session_id)?;
        raw.parse::<i64>().map_err(|_| {
            AuditError::construction(action, "new_session_id", format!("'{raw}' is not an integer"))
        })
    }

    pub fn non_empty(
        action: AuditActionKind,
        name: &str,
        value: &Option<String>,
    ) -> Result<String, AuditError> {
        let value = required(action, name, value)?;
        if value.is_empty() {
            return Err(AuditError::construction(action, name, "must not be empty"));
        }
        Ok(value.to_string())
    }

    pub fn flag_setting(f: &PayloadFields) -> Result<FlagSetting, AuditError> {
        let action = AuditActionKind::FlipFlag;
        let identifier = required(action, "flag", &f.flag)?;
        let entry = registry::flag_entry(identifier)?;
        let value = f
            .value
            .clone()
            .ok_or_else(|| AuditError::missing(action, entry.value_name))?;
        FlagSetting::new(entry.flag, value)
    }

    pub fn endorsement(
        action: AuditActionKind,
        f: &PayloadFields,
    ) -> Result<Endorsement, AuditError> {
        Endorsement::new(
            action,
            required(action, "endorser", &f.endorser)?,
            required(action, "category", &f.category)?,
            required(action, "endorsee", &f.endorsee)?,
        )
    }

    pub fn status(name: &str, value: &Option<String>) -> Result<VetoStatus, AuditError> {
        let action = AuditActionKind::ArxivChangeStatus;
        required(action, name, value)?
            .parse::<VetoStatus>()
            .map_err(|reason| AuditError::construction(action, name, reason))
    }
}

/// `data` parsers used by the registry decoders.
pub(crate) mod grammar {
    use super::*;

    pub fn paper_id(action: AuditActionKind, data: &str) -> Result<String, AuditError> {
        check_paper_id(data).map_err(|reason| AuditError::decode(action, data, reason))?;
        Ok(data.to_string())
    }

    pub fn new_session_id(data: &str) -> Result<i64, AuditError> {
        data.parse::<i64>().map_err(|_| {
            AuditError::decode(AuditActionKind::BecomeUser, data, "session id is not an integer")
        })
    }

    pub fn non_empty(action: AuditActionKind, data: &str) -> Result<String, AuditError> {
        if data.is_empty() {
            return Err(AuditError::decode(action, data, "must not be empty"));
        }
        Ok(data.to_string())
    }

    pub fn empty(action: AuditActionKind, data: &str) -> Result<(), AuditError> {
        if !data.is_empty() {
            return Err(AuditError::decode(action, data, "expected no data"));
        }
        Ok(())
    }

    pub fn status_change(data: &str) -> Result<(VetoStatus, VetoStatus), AuditError> {
        let action = AuditActionKind::ArxivChangeStatus;
        let (before, after) = data
            .split_once(STATUS_SEPARATOR)
            .ok_or_else(|| AuditError::decode(action, data, "expected '<before> -> <after>'"))?;
        let before = before
            .parse::<VetoStatus>()
            .map_err(|reason| AuditError::decode(action, data, reason))?;
        let after = after
            .parse::<VetoStatus>()
            .map_err(|reason| AuditError::decode(action, data, reason))?;
        Ok((before, after))
    }

    pub fn banned(action: AuditActionKind, data: &str, banned: bool) -> Result<(), AuditError> {
        let expected = banned_setting(banned).encode();
        if data != expected {
            return Err(AuditError::decode(action, data, format!("expected '{expected}'")));
        }
        Ok(())
    }
}

fn check_paper_id(paper_id: &str) -> Result<(), &'static str> {
    if paper_id.is_empty() {
        return Err("paper id must not be empty");
    }
    if paper_id.contains(char::is_whitespace) {
        return Err("paper id must not contain whitespace");
    }
    Ok(())
}

/// A complete admin audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAuditEvent {
    pub envelope: AuditEnvelope,
    pub payload: AuditPayload,
}

impl AdminAuditEvent {
    pub fn new(envelope: AuditEnvelope, payload: AuditPayload) -> Self {
        Self { envelope, payload }
    }

    /// Build an event from loose fields by action tag.
    pub fn construct(
        tag: &str,
        envelope: AuditEnvelope,
        fields: &PayloadFields,
    ) -> Result<Self, AuditError> {
        let payload = registry::construct_by_action(tag, fields)?;
        Ok(Self::new(envelope, payload))
    }

    /// Rebuild an event from its stored action tag and `data`.
    pub fn decode(tag: &str, envelope: AuditEnvelope, data: &str) -> Result<Self, AuditError> {
        let payload = registry::decode_by_action(tag, data)?;
        Ok(Self::new(envelope, payload))
    }

    #[must_use]
    pub fn action(&self) -> AuditActionKind {
        self.payload.kind()
    }

    /// Encoded `data` column.
    #[must_use]
    pub fn data(&self) -> String {
        self.payload.encode()
    }

    /// Row to append to `tapir_admin_audit`.
    #[must_use]
    pub fn to_record(&self) -> NewAdminAudit {
        let env = &self.envelope;
        NewAdminAudit {
            log_date: env.timestamp,
            session_id: env.session_id,
            ip_addr: env.remote_ip.clone().unwrap_or_default(),
            remote_host: env.remote_hostname.clone().unwrap_or_default(),
            admin_user: env.admin_user_id,
            affected_user: env.affected_user_id,
            tracking_cookie: env.tracking_cookie.clone().unwrap_or_default(),
            action: self.action().as_str().to_string(),
            data: self.data(),
            comment: env.comment.clone().unwrap_or_default(),
        }
    }

    /// Decode a stored audit row.
    ///
    /// Empty string columns come back as `None`.
    pub fn from_record(record: &TapirAdminAudit) -> Result<Self, AuditError> {
        let admin_user_id = record.admin_user.ok_or_else(|| {
            AuditError::decode(&record.action, &record.data, "admin_user is null")
        })?;
        let envelope = AuditEnvelope {
            timestamp: record.log_date,
            admin_user_id,
            affected_user_id: record.affected_user,
            session_id: record.session_id,
            remote_ip: non_blank(&record.ip_addr),
            remote_hostname: non_blank(&record.remote_host),
            tracking_cookie: non_blank(&record.tracking_cookie),
            comment: non_blank(&record.comment),
        };
        Self::decode(&record.action, envelope, &record.data)
    }
}

fn non_blank(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn non_blank_owned(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
