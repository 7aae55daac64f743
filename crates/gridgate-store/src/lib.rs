//! Configuration store for the gridgate control plane.
//!
//! The store is the single source of truth shared by every gateway process
//! and by the DNS server and TCP router that consume the records. This crate
//! exposes it through the narrow [`ConfigStore`] interface: per-key
//! get/set/delete, a hash-field variant, and two conditional writes used to
//! narrow ownership races. There are no multi-key transactions.
//!
//! Backends:
//!
//! - [`MemoryStore`] - process-local, for tests and single-process setups
//! - [`SqliteStore`] - a `SQLite` file in WAL mode, shareable across processes

#![doc(html_root_url = "https://docs.rs/gridgate-store/0.3.0")]

mod memory;
mod sqlite;

use async_trait::async_trait;
use gridgate_core::GatewayError;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by store backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error from `SQLite`
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error while opening the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A plain-key operation hit a hash, or the other way round
    #[error("WRONGTYPE operation against key '{0}' holding the wrong kind of value")]
    WrongType(String),

    /// The blocking worker running the query died
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Key/value interface to the shared configuration store.
///
/// Mirrors the subset of a Redis-like server that the authorities need.
/// Every method is atomic for the single key it touches.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read a plain key
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a plain key
    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Remove a plain key or a whole hash. Returns true if something was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Replace a plain key only if its current value equals `expected`.
    ///
    /// `expected == None` means "key must be absent"; `new == None` deletes the
    /// key. Returns false, without writing, when the current value differs.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<Vec<u8>>,
    ) -> StoreResult<bool>;

    /// Read one field of a hash
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write one field of a hash
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Write one field only if it does not exist yet. Returns true if written.
    async fn hset_if_absent(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<bool>;

    /// Remove one field of a hash. Returns true if it existed.
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// List the fields of a hash, sorted
    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>>;
}
