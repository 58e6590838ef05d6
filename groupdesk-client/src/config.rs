//! Client configuration

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Timers and limits of the session sync layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between periodic session revalidations
    pub session_check_secs: u64,
    /// Seconds between unread-count refreshes
    pub notification_poll_secs: u64,
    /// Upper bound on one validator round trip
    pub validate_timeout_secs: u64,
}

impl SyncSettings {
    pub fn session_check_interval(&self) -> Duration {
        Duration::from_secs(self.session_check_secs)
    }

    pub fn notification_poll_interval(&self) -> Duration {
        Duration::from_secs(self.notification_poll_secs)
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_secs(self.validate_timeout_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            session_check_secs: 30 * 60,
            notification_poll_secs: 5 * 60,
            validate_timeout_secs: 10,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the hosted backend
    pub backend_url: String,

    /// Project API key sent with every request
    pub api_key: String,

    /// Pre-issued access token to adopt at startup
    pub access_token: Option<String>,

    /// SQLite file for the session cache; in-memory when unset
    pub cache_path: Option<String>,

    pub sync: SyncSettings,
}

impl Config {
    /// Create config from environment variables
    ///
    /// All optional:
    /// - GROUPDESK_BACKEND_URL (default: http://localhost:54321)
    /// - GROUPDESK_API_KEY
    /// - GROUPDESK_ACCESS_TOKEN
    /// - GROUPDESK_CACHE_PATH
    /// - GROUPDESK_SESSION_CHECK_SECS (default: 1800)
    /// - GROUPDESK_NOTIFICATION_POLL_SECS (default: 300)
    /// - GROUPDESK_VALIDATE_TIMEOUT_SECS (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any variable lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|s| !s.is_empty());
        let secs = |key: &str, default: u64| {
            get(key)
                .and_then(|s| s.parse().ok())
                .filter(|&n: &u64| n > 0)
                .unwrap_or(default)
        };

        let defaults = Self::default();
        Self {
            backend_url: get("GROUPDESK_BACKEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.backend_url),
            api_key: get("GROUPDESK_API_KEY").unwrap_or_default(),
            access_token: get("GROUPDESK_ACCESS_TOKEN"),
            cache_path: get("GROUPDESK_CACHE_PATH"),
            sync: SyncSettings {
                session_check_secs: secs(
                    "GROUPDESK_SESSION_CHECK_SECS",
                    defaults.sync.session_check_secs,
                ),
                notification_poll_secs: secs(
                    "GROUPDESK_NOTIFICATION_POLL_SECS",
                    defaults.sync.notification_poll_secs,
                ),
                validate_timeout_secs: secs(
                    "GROUPDESK_VALIDATE_TIMEOUT_SECS",
                    defaults.sync.validate_timeout_secs,
                ),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            access_token: None,
            cache_path: None,
            sync: SyncSettings::default(),
        }
    }
}

// Secrets stay out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("cache_path", &self.cache_path)
            .field("sync", &self.sync)
            .finish()
    }
}
