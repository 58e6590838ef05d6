//! Group invitations and their expiry

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::access::GroupRole;

/// Days an invitation stays usable after it is created
pub const INVITATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// An invitation to join a group with a given role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub group_id: String,
    pub email: String,
    pub role: GroupRole,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded: Option<InvitationResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationResponse {
    Accepted,
    Declined,
}

impl Invitation {
    pub fn new(
        group_id: impl Into<String>,
        email: impl Into<String>,
        role: GroupRole,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            email: email.into().to_lowercase(),
            role,
            created_at,
            responded: None,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::days(INVITATION_TTL_DAYS)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at() - now).max(Duration::zero())
    }

    /// A response settles the invitation even if it is past expiry now
    pub fn status(&self, now: DateTime<Utc>) -> InvitationStatus {
        match self.responded {
            Some(InvitationResponse::Accepted) => InvitationStatus::Accepted,
            Some(InvitationResponse::Declined) => InvitationStatus::Declined,
            None if self.is_expired(now) => InvitationStatus::Expired,
            None => InvitationStatus::Pending,
        }
    }
}
