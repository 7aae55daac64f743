//! `SQLite`-backed store.
//!
//! Several gateway processes may open the same database file. WAL mode lets
//! readers proceed while one writer holds the lock, and the conditional
//! writes run inside `IMMEDIATE` transactions so the read and the write are
//! one atomic step across processes.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::{ConfigStore, StoreError, StoreResult};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Store kept in a `SQLite` database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!(path = %path.display(), "opened sqlite store");
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Returns true if the database runs in WAL mode
    pub async fn is_wal_mode(&self) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            Ok(mode.eq_ignore_ascii_case("wal"))
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn read_value(conn: &Connection, key: &str) -> StoreResult<Option<Vec<u8>>> {
    Ok(conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?)
}

fn ensure_not_hash(conn: &Connection, key: &str) -> StoreResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM hash WHERE key = ?1)",
        params![key],
        |row| row.get(0),
    )?;
    if exists {
        return Err(StoreError::WrongType(key.to_string()));
    }
    Ok(())
}

fn ensure_not_plain(conn: &Connection, key: &str) -> StoreResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1)",
        params![key],
        |row| row.get(0),
    )?;
    if exists {
        return Err(StoreError::WrongType(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            ensure_not_hash(conn, &key)?;
            read_value(conn, &key)
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_not_hash(&tx, &key)?;
            tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let plain = tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            let fields = tx.execute("DELETE FROM hash WHERE key = ?1", params![key])?;
            tx.commit()?;
            Ok(plain + fields > 0)
        })
        .await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Vec<u8>>,
    ) -> StoreResult<bool> {
        let key = key.to_string();
        let expected = expected.map(<[u8]>::to_vec);
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_not_hash(&tx, &key)?;
            if read_value(&tx, &key)? != expected {
                return Ok(false);
            }
            match new {
                Some(value) => tx.execute(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?,
                None => tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?,
            };
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_conn(move |conn| {
            ensure_not_plain(conn, &key)?;
            Ok(conn
                .query_row(
                    "SELECT value FROM hash WHERE key = ?1 AND field = ?2",
                    params![key, field],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_not_plain(&tx, &key)?;
            tx.execute(
                "INSERT INTO hash (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
                params![key, field, value],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn hset_if_absent(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<bool> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_not_plain(&tx, &key)?;
            let inserted = tx.execute(
                "INSERT INTO hash (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO NOTHING",
                params![key, field, value],
            )?;
            tx.commit()?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let (key, field) = (key.to_string(), field.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_not_plain(&tx, &key)?;
            let removed = tx.execute(
                "DELETE FROM hash WHERE key = ?1 AND field = ?2",
                params![key, field],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            ensure_not_plain(conn, &key)?;
            let mut stmt = conn.prepare("SELECT field FROM hash WHERE key = ?1 ORDER BY field")?;
            let fields = stmt
                .query_map(params![key], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(fields)
        })
        .await
    }
}
