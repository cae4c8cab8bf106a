//! Admin action vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// Every action tag that may appear in `tapir_admin_audit.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditActionKind {
    #[serde(rename = "add-comment")]
    AddComment,
    #[serde(rename = "add-paper-owner")]
    AddPaperOwner,
    #[serde(rename = "add-paper-owner-2")]
    AddPaperOwner2,
    #[serde(rename = "arXiv-change-paper-pw")]
    ArxivChangePaperPw,
    #[serde(rename = "arXiv-change-status")]
    ArxivChangeStatus,
    #[serde(rename = "arXiv-make-author")]
    ArxivMakeAuthor,
    #[serde(rename = "arXiv-make-nonauthor")]
    ArxivMakeNonauthor,
    #[serde(rename = "arXiv-revoke-paper-owner")]
    ArxivRevokePaperOwner,
    #[serde(rename = "arXiv-unrevoke-paper-owner")]
    ArxivUnrevokePaperOwner,
    #[serde(rename = "become-user")]
    BecomeUser,
    #[serde(rename = "change-email")]
    ChangeEmail,
    #[serde(rename = "change-paper-pw")]
    ChangePaperPw,
    #[serde(rename = "change-password")]
    ChangePassword,
    #[serde(rename = "endorsed-by-suspect")]
    EndorsedBySuspect,
    #[serde(rename = "flip-flag")]
    FlipFlag,
    #[serde(rename = "got-negative-endorsement")]
    GotNegativeEndorsement,
    #[serde(rename = "make-moderator")]
    MakeModerator,
    #[serde(rename = "revoke-paper-owner")]
    RevokePaperOwner,
    #[serde(rename = "suspend-user")]
    SuspendUser,
    #[serde(rename = "unmake-moderator")]
    UnmakeModerator,
    #[serde(rename = "unsuspend-user")]
    UnsuspendUser,
}

impl AuditActionKind {
    /// All action kinds in tag order.
    pub const ALL: [AuditActionKind; 21] = [
        Self::AddComment,
        Self::AddPaperOwner,
        Self::AddPaperOwner2,
        Self::ArxivChangePaperPw,
        Self::ArxivChangeStatus,
        Self::ArxivMakeAuthor,
        Self::ArxivMakeNonauthor,
        Self::ArxivRevokePaperOwner,
        Self::ArxivUnrevokePaperOwner,
        Self::BecomeUser,
        Self::ChangeEmail,
        Self::ChangePaperPw,
        Self::ChangePassword,
        Self::EndorsedBySuspect,
        Self::FlipFlag,
        Self::GotNegativeEndorsement,
        Self::MakeModerator,
        Self::RevokePaperOwner,
        Self::SuspendUser,
        Self::UnmakeModerator,
        Self::UnsuspendUser,
    ];

    /// The tag stored in the `action` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddComment => "add-comment",
            Self::AddPaperOwner => "add-paper-owner",
            Self::AddPaperOwner2 => "add-paper-owner-2",
            Self::ArxivChangePaperPw => "arXiv-change-paper-pw",
            Self::ArxivChangeStatus => "arXiv-change-status",
            Self::ArxivMakeAuthor => "arXiv-make-author",
            Self::ArxivMakeNonauthor => "arXiv-make-nonauthor",
            Self::ArxivRevokePaperOwner => "arXiv-revoke-paper-owner",
            Self::ArxivUnrevokePaperOwner => "arXiv-unrevoke-paper-owner",
            Self::BecomeUser => "become-user",
            Self::ChangeEmail => "change-email",
            Self::ChangePaperPw => "change-paper-pw",
            Self::ChangePassword => "change-password",
            Self::EndorsedBySuspect => "endorsed-by-suspect",
            Self::FlipFlag => "flip-flag",
            Self::GotNegativeEndorsement => "got-negative-endorsement",
            Self::MakeModerator => "make-moderator",
            Self::RevokePaperOwner => "revoke-paper-owner",
            Self::SuspendUser => "suspend-user",
            Self::UnmakeModerator => "unmake-moderator",
            Self::UnsuspendUser => "unsuspend-user",
        }
    }

    /// True for actions whose payload is a paper identifier.
    #[must_use]
    pub fn is_paper_action(&self) -> bool {
        matches!(
            self,
            Self::AddPaperOwner
                | Self::AddPaperOwner2
                | Self::ArxivChangePaperPw
                | Self::ArxivMakeAuthor
                | Self::ArxivMakeNonauthor
                | Self::ArxivRevokePaperOwner
                | Self::ArxivUnrevokePaperOwner
                | Self::ChangePaperPw
                | Self::RevokePaperOwner
        )
    }
}

impl fmt::Display for AuditActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditActionKind {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AuditError::UnknownAction { tag: s.to_string() })
    }
}
