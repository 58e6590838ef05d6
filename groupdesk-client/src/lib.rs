//! GroupDesk Session Sync
//!
//! Client-side session and notification synchronization for GroupDesk:
//! keeps the signed-in user in step with the hosted backend and the
//! persisted cache, and polls the unread notification count while someone
//! is signed in.

pub mod auth;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod notifications;
pub mod scheduler;

pub use auth::{AuthController, AuthState, SessionListener};
pub use backend::{BackendSession, HttpBackend, IdentityBackend, NotificationBackend};
pub use config::{Config, SyncSettings};
pub use context::AppContext;
pub use error::{ClientError, ClientResult};
pub use notifications::NotificationCounter;
pub use scheduler::{LifecycleEvent, LifecycleHandle, SessionScheduler};
