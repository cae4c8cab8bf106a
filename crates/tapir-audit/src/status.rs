//! Closed enumerations referenced by audit payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// Submission veto status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VetoStatus {
    Ok,
    NoUpload,
    NoReplace,
}

impl VetoStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NoUpload => "no-upload",
            Self::NoReplace => "no-replace",
        }
    }
}

impl fmt::Display for VetoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VetoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "no-upload" => Ok(Self::NoUpload),
            "no-replace" => Ok(Self::NoReplace),
            other => Err(format!("'{other}' is not a veto status")),
        }
    }
}

/// Declared value type of a set-flag identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValueType {
    Bool,
    Int,
}

/// Identifiers of the set-flag family, as `table.column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserFlag {
    #[serde(rename = "arXiv_demographics.flag_group_test")]
    GroupTest,
    #[serde(rename = "arXiv_demographics.flag_proxy")]
    Proxy,
    #[serde(rename = "arXiv_demographics.flag_suspect")]
    Suspect,
    #[serde(rename = "arXiv_demographics.flag_xml")]
    Xml,
    #[serde(rename = "arXiv_endorsements.flag_valid")]
    EndorsementValid,
    #[serde(rename = "arXiv_endorsements.point_value")]
    EndorsementPointValue,
    #[serde(rename = "arXiv_endorsement_requests.flag_valid")]
    EndorsementRequestValid,
    #[serde(rename = "tapir_users.email_bouncing")]
    EmailBouncing,
    #[serde(rename = "tapir_users.flag_banned")]
    Banned,
    #[serde(rename = "tapir_users.flag_edit_system")]
    EditSystem,
    #[serde(rename = "tapir_users.flag_edit_users")]
    EditUsers,
    #[serde(rename = "tapir_users.flag_email_verified")]
    EmailVerified,
}

impl UserFlag {
    pub const ALL: [UserFlag; 12] = [
        Self::GroupTest,
        Self::Proxy,
        Self::Suspect,
        Self::Xml,
        Self::EndorsementValid,
        Self::EndorsementPointValue,
        Self::EndorsementRequestValid,
        Self::EmailBouncing,
        Self::Banned,
        Self::EditSystem,
        Self::EditUsers,
        Self::EmailVerified,
    ];

    /// Stable dotted identifier used in set-flag payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GroupTest => "arXiv_demographics.flag_group_test",
            Self::Proxy => "arXiv_demographics.flag_proxy",
            Self::Suspect => "arXiv_demographics.flag_suspect",
            Self::Xml => "arXiv_demographics.flag_xml",
            Self::EndorsementValid => "arXiv_endorsements.flag_valid",
            Self::EndorsementPointValue => "arXiv_endorsements.point_value",
            Self::EndorsementRequestValid => "arXiv_endorsement_requests.flag_valid",
            Self::EmailBouncing => "tapir_users.email_bouncing",
            Self::Banned => "tapir_users.flag_banned",
            Self::EditSystem => "tapir_users.flag_edit_system",
            Self::EditUsers => "tapir_users.flag_edit_users",
            Self::EmailVerified => "tapir_users.flag_email_verified",
        }
    }

    #[must_use]
    pub fn value_type(&self) -> FlagValueType {
        match self {
            Self::EndorsementPointValue => FlagValueType::Int,
            _ => FlagValueType::Bool,
        }
    }

    /// Keyword name of the value when the event is built from loose fields.
    #[must_use]
    pub fn value_name(&self) -> &'static str {
        match self {
            Self::GroupTest => "group_test",
            Self::Proxy => "proxy",
            Self::Suspect => "suspect",
            Self::Xml => "xml",
            Self::EndorsementValid => "endorsement_valid",
            Self::EndorsementPointValue => "point_value",
            Self::EndorsementRequestValid => "endorsement_requests_valid",
            Self::EmailBouncing => "email_bouncing",
            Self::Banned => "banned",
            Self::EditSystem => "edit_system",
            Self::EditUsers => "edit_users",
            Self::EmailVerified => "verified",
        }
    }
}

impl fmt::Display for UserFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserFlag {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| AuditError::UnknownFlag { flag: s.to_string() })
    }
}
