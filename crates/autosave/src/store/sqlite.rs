//! SQLite-backed primary snapshot tier.
//!
//! The connection lives behind a mutex and every call hops through
//! `spawn_blocking`, keeping SQLite's blocking I/O off the async executor.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::backend::StorageBackend;
use crate::error::{AutosaveError, AutosaveResult};
use crate::snapshot::now_ms;

/// Structured store for full snapshot payloads, one row per storage key.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> AutosaveResult<Self> {
        Self::from_connection(Connection::open(path.as_ref())?)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> AutosaveResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> AutosaveResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run_blocking<F, R>(&self, f: F) -> AutosaveResult<R>
    where
        F: FnOnce(&mut Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn_arc = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn_arc.lock().unwrap();
            f(&mut conn)
        })
        .await
        .map_err(|e| AutosaveError::Other(format!("Task execution failed: {}", e)))?
        .map_err(AutosaveError::from)
    }
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS snapshots (
            key           TEXT PRIMARY KEY,
            payload       TEXT NOT NULL,
            updated_at_ms INTEGER NOT NULL
        );
        "#,
    )
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn put(&self, key: &str, payload: &str) -> AutosaveResult<()> {
        let key = key.to_string();
        let payload = payload.to_string();
        let updated_at = now_ms();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO snapshots (key, payload, updated_at_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET payload = ?2, updated_at_ms = ?3",
                params![key, payload, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> AutosaveResult<Option<String>> {
        let key = key.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT payload FROM snapshots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn delete(&self, key: &str) -> AutosaveResult<()> {
        let key = key.to_string();
        self.run_blocking(move |conn| {
            conn.execute("DELETE FROM snapshots WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }
}
