//! Hosted REST backend over HTTP
//!
//! Speaks the auth (`/auth/v1`) and table (`/rest/v1`) endpoints of the
//! hosted backend-as-a-service. The access token is held in memory and,
//! when a token store is attached, persisted so a restart can resume it.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use groupdesk_core::cache::TOKEN_KEY;
use groupdesk_core::{KeyValueStore, StorageError, User, UserId};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{BackendSession, IdentityBackend, NotificationBackend};
use crate::error::{ClientError, ClientResult};

/// User object as the auth endpoints return it
#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: WireMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct WireMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
}

impl From<WireUser> for User {
    fn from(wire: WireUser) -> Self {
        User {
            id: UserId(wire.id),
            email: wire.email.unwrap_or_default(),
            name: wire.user_metadata.name,
            nickname: wire.user_metadata.nickname,
            phone: wire.phone.filter(|p| !p.is_empty()),
            created_at: wire.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: WireUser,
}

/// HTTP client for the hosted backend
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    session: RwLock<Option<BackendSession>>,
    token_store: Option<Arc<dyn KeyValueStore>>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("groupdesk-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session: RwLock::new(None),
            token_store: None,
        })
    }

    /// Adopt a token issued elsewhere (e.g. from configuration)
    pub fn with_access_token(self, token: impl Into<String>) -> Self {
        *self.session.write().unwrap() = Some(BackendSession {
            access_token: token.into(),
            expires_at: None,
        });
        self
    }

    /// Keep the access token in `store` so a restarted client resumes the
    /// session. A token already stored there is picked up on first use.
    pub fn with_token_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Session held in memory, falling back to the token store
    fn session(&self) -> Option<BackendSession> {
        if let Some(session) = self.session.read().unwrap().clone() {
            return Some(session);
        }

        let stored = self.load_session()?;
        *self.session.write().unwrap() = Some(stored.clone());
        Some(stored)
    }

    fn load_session(&self) -> Option<BackendSession> {
        let store = self.token_store.as_ref()?;
        let raw = match store.get(TOKEN_KEY) {
            Ok(raw) => raw?,
            Err(StorageError::Unavailable) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored access token");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable stored access token");
                None
            }
        }
    }

    fn save_session(&self, session: Option<&BackendSession>) {
        let Some(store) = self.token_store.as_ref() else {
            return;
        };

        let result = match session {
            Some(session) => match serde_json::to_string(session) {
                Ok(raw) => store.set(TOKEN_KEY, &raw),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode access token");
                    return;
                }
            },
            None => store.remove(TOKEN_KEY),
        };

        match result {
            Ok(()) | Err(StorageError::Unavailable) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to persist access token"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> Option<String> {
        self.session().map(|s| s.access_token)
    }

    fn authorized(&self, builder: RequestBuilder) -> ClientResult<RequestBuilder> {
        let token = self.token().ok_or(ClientError::NotAuthenticated)?;
        Ok(builder.header("apikey", &self.api_key).bearer_auth(token))
    }

    async fn check(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ClientError::Unauthorized(message))
            }
            _ => Err(ClientError::Http {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> ClientResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Total from a `Content-Range` header such as `0-2/3` or `*/0`
pub(crate) fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[async_trait]
impl IdentityBackend for HttpBackend {
    async fn current_session(&self) -> Option<BackendSession> {
        self.session()
    }

    async fn validate_session(&self) -> ClientResult<User> {
        let request = self.authorized(self.client.get(self.url("/auth/v1/user")))?;
        let response = Self::check(request.send().await?).await?;
        let user: WireUser = Self::decode(response).await?;
        Ok(user.into())
    }

    async fn sign_out(&self) -> ClientResult<()> {
        let request = match self.authorized(self.client.post(self.url("/auth/v1/logout"))) {
            Ok(request) => request,
            // Nothing to end on the server
            Err(ClientError::NotAuthenticated) => return Ok(()),
            Err(e) => return Err(e),
        };

        // The local token is dropped even if the server call fails
        self.session.write().unwrap().take();
        self.save_session(None);
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<User> {
        let response = self
            .client
            .post(self.url("/auth/v1/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let token: TokenResponse = Self::decode(Self::check(response).await?).await?;
        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        let session = BackendSession {
            access_token: token.access_token,
            expires_at,
        };
        self.save_session(Some(&session));
        *self.session.write().unwrap() = Some(session);

        tracing::debug!(user_id = %token.user.id, "Signed in with password");
        Ok(token.user.into())
    }
}

#[async_trait]
impl NotificationBackend for HttpBackend {
    async fn unread_count(&self, user_id: &UserId) -> ClientResult<u64> {
        let user_filter = format!("eq.{}", user_id);
        let request = self.authorized(
            self.client
                .get(self.url("/rest/v1/notifications"))
                .query(&[
                    ("select", "id"),
                    ("user_id", user_filter.as_str()),
                    ("is_read", "eq.false"),
                ])
                .header("Prefer", "count=exact")
                .header("Range", "0-0"),
        )?;
        let response = Self::check(request.send().await?).await?;

        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| ClientError::Decode("missing or invalid Content-Range".to_string()))
    }
}
