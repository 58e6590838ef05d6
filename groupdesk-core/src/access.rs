//! Group roles and the permission checks the client mirrors
//!
//! The backend enforces these rules with row-level security; the client
//! only uses them to decide which actions to offer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Role of a member within one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Member,
    Admin,
    Owner,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Owner => "owner",
            GroupRole::Admin => "admin",
            GroupRole::Member => "member",
        }
    }

    /// Invite, remove and re-role members
    pub fn can_manage_members(&self) -> bool {
        *self >= GroupRole::Admin
    }

    /// Define the group's custom input fields
    pub fn can_manage_fields(&self) -> bool {
        *self >= GroupRole::Admin
    }

    /// See every member's reports and approve or reject them
    pub fn can_review_reports(&self) -> bool {
        *self >= GroupRole::Admin
    }

    pub fn can_submit_reports(&self) -> bool {
        true
    }

    pub fn can_delete_group(&self) -> bool {
        *self == GroupRole::Owner
    }

    /// Whether this role may give `target` to another member.
    ///
    /// Ownership is never handed out through role assignment, and admins
    /// cannot raise anyone to their own level.
    pub fn can_assign_role(&self, target: GroupRole) -> bool {
        match self {
            GroupRole::Owner => target != GroupRole::Owner,
            GroupRole::Admin => target == GroupRole::Member,
            GroupRole::Member => false,
        }
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(GroupRole::Owner),
            "admin" => Ok(GroupRole::Admin),
            "member" => Ok(GroupRole::Member),
            _ => Err(Error::UnknownRole(s.to_string())),
        }
    }
}
