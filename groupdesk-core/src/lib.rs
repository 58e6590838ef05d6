//! GroupDesk Core Library
//!
//! Shared pieces of the GroupDesk client:
//! - The user and session records mirrored from the hosted backend
//! - A key-value storage abstraction with memory, SQLite and "unavailable" backends
//! - The persisted session cache that pairs a user with its session descriptor
//! - Client-side duplicates of server rules (roles, invitation expiry, report stats)

pub mod access;
pub mod cache;
pub mod error;
pub mod invitation;
pub mod session;
pub mod stats;
pub mod storage;
pub mod user;

pub use access::GroupRole;
pub use cache::{CachedSession, SessionCache};
pub use error::Error;
pub use session::SessionDescriptor;
pub use storage::{
    KeyValueStore, MemoryStore, SqliteStore, StorageError, StorageEvent, UnavailableStore,
};
pub use user::{User, UserId};

/// Result type for groupdesk-core operations
pub type Result<T> = std::result::Result<T, Error>;
