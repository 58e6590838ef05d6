//! Session descriptors paired with cached users

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::user::{User, UserId};

/// Lifetime of a session descriptor, counted from its last write
pub const SESSION_TTL_HOURS: i64 = 24;

/// Expiry-bearing record stored next to the cached user.
///
/// It only decides whether revalidation is worth attempting; the backend
/// remains the authority on whether the session is actually valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub user_id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionDescriptor {
    /// Descriptor for `user` written at `now`
    pub fn issue(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            created_at: now,
            expires_at: now + Duration::hours(SESSION_TTL_HOURS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
