//! SQLite-based storage implementation

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;

use super::{KeyValueStore, StorageError, StorageEvent, StorageResult, EVENT_CHANNEL_CAPACITY};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

fn backend_err(e: rusqlite::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Durable key-value store in a single SQLite file.
///
/// Change events only reach subscribers in this process; a second process
/// opening the same file sees the data but not the events.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    events: broadcast::Sender<StorageEvent>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path
    pub fn open(path: &str) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(backend_err)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(backend_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        Self::migrate(&conn)?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            events,
        })
    }

    /// Run database migrations
    fn migrate(conn: &Connection) -> StorageResult<()> {
        let current_version = Self::get_schema_version(conn)?;

        if current_version < SCHEMA_VERSION {
            tracing::info!(
                current = current_version,
                target = SCHEMA_VERSION,
                "Running storage migrations"
            );

            if current_version < 1 {
                Self::migrate_v1(conn)?;
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(backend_err)?;
        }

        Ok(())
    }

    /// Current schema version (0 if no schema exists)
    pub(crate) fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
        let table_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
                [],
                |row| row.get(0),
            )
            .map_err(backend_err)?;

        if !table_exists {
            return Ok(0);
        }

        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0).map(|v| v.unwrap_or(0))
        })
        .map_err(backend_err)
    }

    /// Migration to version 1: initial schema
    fn migrate_v1(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(backend_err)
    }

    /// Schema version recorded in the open database
    pub fn schema_version(&self) -> StorageResult<i32> {
        let conn = self.conn.lock().unwrap();
        Self::get_schema_version(&conn)
    }

    fn publish(&self, event: StorageEvent) {
        let _ = self.events.send(event);
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM kv_entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(backend_err)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(backend_err)?;
        }

        self.publish(StorageEvent::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let removed = {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                .map_err(backend_err)?
        };

        if removed > 0 {
            self.publish(StorageEvent::Removed {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT key FROM kv_entries WHERE substr(key, 1, length(?1)) = ?1")
            .map_err(backend_err)?;

        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .map_err(backend_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend_err)?;

        Ok(keys)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.events.subscribe())
    }
}
