//! The store contract consumed by the runtime manager.

use std::time::Duration;

use crate::error::StoreResult;

/// A live key/value pair returned by a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: Vec<u8>,
}

/// Durable (or process-local) key/value storage with per-record TTL.
///
/// Implementations must hide expired records from every read and treat
/// them as absent for [`Store::write_if_absent`].
pub trait Store: Send + Sync {
    /// Insert or replace a record. `ttl = None` means it never expires.
    fn write(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()>;

    /// Insert a record only if no live record exists under `key`.
    ///
    /// Returns `true` if this call wrote the record.
    fn write_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>)
    -> StoreResult<bool>;

    /// Read a single record by exact key.
    fn read(&self, key: &str) -> StoreResult<Option<Record>>;

    /// Read every record whose key starts with `prefix`, ordered by key.
    fn read_prefix(&self, prefix: &str) -> StoreResult<Vec<Record>>;

    /// List the keys starting with `prefix`, ordered.
    fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Delete a record. Returns `true` if a live record existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;
}
