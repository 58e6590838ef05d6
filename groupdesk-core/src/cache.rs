//! Persisted session cache
//!
//! Holds the signed-in user and its session descriptor as one versioned
//! record, so a reader can never observe one half of the pair without the
//! other. Anything that fails to decode is treated as absent and wiped.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::session::SessionDescriptor;
use crate::storage::{KeyValueStore, StorageError};
use crate::user::User;

/// Key holding the versioned session record
pub const SESSION_KEY: &str = "groupdesk.session";

/// Key the identity backend client keeps its access token under. Cleared
/// together with the session record.
pub const TOKEN_KEY: &str = "groupdesk.auth.token";

/// Version tag written into every record
pub const CACHE_VERSION: u32 = 1;

/// Keys from the pre-envelope layout, where user and session were stored apart
pub const LEGACY_KEYS: [&str; 2] = ["user", "session"];

/// Per-user artifacts that must not leak to the next signed-in identity
pub const AUXILIARY_PREFIXES: [&str; 2] = ["groupdesk.group.", "groupdesk.notification."];

/// The record stored under [`SESSION_KEY`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub version: u32,
    pub user: User,
    pub session: SessionDescriptor,
}

impl CachedSession {
    pub fn new(user: User, session: SessionDescriptor) -> Self {
        Self {
            version: CACHE_VERSION,
            user,
            session,
        }
    }

    /// Decode a stored record, rejecting unknown versions
    pub fn decode(raw: &str) -> Result<Self, Error> {
        // Check the tag before the shape so a future layout is reported as such
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let found = value
            .get("version")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        if found != CACHE_VERSION {
            return Err(Error::UnsupportedVersion {
                found,
                expected: CACHE_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Session cache over any key-value store.
///
/// Every operation degrades to a no-op when storage is unavailable.
pub struct SessionCache<S> {
    store: S,
}

impl<S: KeyValueStore> SessionCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the cached pair; `None` if missing, corrupt or unsupported
    pub fn read(&self) -> Option<CachedSession> {
        let raw = match self.store.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log_storage_error("read", &e);
                return None;
            }
        };

        match CachedSession::decode(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable session cache");
                self.clear();
                None
            }
        }
    }

    /// Store the pair in one write
    pub fn write(&self, user: &User, session: &SessionDescriptor) {
        let record = CachedSession::new(user.clone(), session.clone());
        let raw = match record.encode() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode session cache");
                return;
            }
        };

        if let Err(e) = self.store.set(SESSION_KEY, &raw) {
            log_storage_error("write", &e);
        }
    }

    /// Remove the session record, the access token, legacy keys and
    /// per-user artifacts
    pub fn clear(&self) {
        let mut keys: Vec<String> = [SESSION_KEY, TOKEN_KEY]
            .into_iter()
            .chain(LEGACY_KEYS)
            .map(str::to_string)
            .collect();

        for prefix in AUXILIARY_PREFIXES {
            match self.store.keys_with_prefix(prefix) {
                Ok(found) => keys.extend(found),
                Err(e) => {
                    log_storage_error("clear", &e);
                    if e == StorageError::Unavailable {
                        return;
                    }
                }
            }
        }

        for key in keys {
            if let Err(e) = self.store.remove(&key) {
                log_storage_error("clear", &e);
                if e == StorageError::Unavailable {
                    return;
                }
            }
        }
    }
}

fn log_storage_error(op: &str, e: &StorageError) {
    match e {
        StorageError::Unavailable => tracing::debug!(op, "Storage unavailable, skipping"),
        StorageError::Backend(msg) => tracing::warn!(op, error = %msg, "Session cache storage error"),
    }
}
