//! Backend abstractions the sync layer talks to

pub mod http;

pub use http::HttpBackend;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupdesk_core::{User, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

/// A session as the identity backend holds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSession {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Identity backend: sessions and the canonical user record.
///
/// Authorization is enforced server-side; callers trust what comes back.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// The session the backend client currently holds, if any
    async fn current_session(&self) -> Option<BackendSession>;

    /// Re-confirm the current session and return the canonical user
    async fn validate_session(&self) -> ClientResult<User>;

    /// End the backend session
    async fn sign_out(&self) -> ClientResult<()>;

    /// Exchange credentials for a session
    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<User>;
}

/// Notification backend
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Number of notifications `user_id` has not marked read
    async fn unread_count(&self, user_id: &UserId) -> ClientResult<u64>;
}

#[async_trait]
impl<T: IdentityBackend + ?Sized> IdentityBackend for Arc<T> {
    async fn current_session(&self) -> Option<BackendSession> {
        (**self).current_session().await
    }

    async fn validate_session(&self) -> ClientResult<User> {
        (**self).validate_session().await
    }

    async fn sign_out(&self) -> ClientResult<()> {
        (**self).sign_out().await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<User> {
        (**self).sign_in_with_password(email, password).await
    }
}

#[async_trait]
impl<T: NotificationBackend + ?Sized> NotificationBackend for Arc<T> {
    async fn unread_count(&self, user_id: &UserId) -> ClientResult<u64> {
        (**self).unread_count(user_id).await
    }
}
