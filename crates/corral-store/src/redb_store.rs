//! RedbStore: redb-backed [`Store`] with per-record expiry.
//!
//! Supports both on-disk and in-memory backends. The on-disk store is the
//! durable store shared by managers; the in-memory one serves as the
//! process-local cache for statuses and processed-markers.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{Record, Store};
use crate::tables::RECORDS;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

const HEADER_LEN: usize = 8;

/// Thread-safe key/value store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Physically remove every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let now = now_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            let expired: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    is_expired(value.value(), now).then(|| key.value().to_string())
                })
                .collect();
            for key in &expired {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            removed = expired.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(removed, "expired records purged");
        Ok(removed)
    }

    /// Scan live records under `prefix`, handing each `(key, payload)` to `f`.
    fn scan_prefix<T>(
        &self,
        prefix: &str,
        mut f: impl FnMut(&str, &[u8]) -> T,
    ) -> StoreResult<Vec<T>> {
        let now = now_millis();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            let raw = value.value();
            if is_expired(raw, now) {
                continue;
            }
            results.push(f(key, payload(key, raw)?));
        }
        Ok(results)
    }
}

impl Store for RedbStore {
    fn write(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let encoded = encode(value, ttl);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            table
                .insert(key, encoded.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, ?ttl, "record stored");
        Ok(())
    }

    fn write_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let now = now_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let written;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            let occupied = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => !is_expired(guard.value(), now),
                None => false,
            };
            if !occupied {
                let encoded = encode(value, ttl);
                table
                    .insert(key, encoded.as_slice())
                    .map_err(map_err!(Write))?;
            }
            written = !occupied;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, written, "conditional write");
        Ok(written)
    }

    fn read(&self, key: &str) -> StoreResult<Option<Record>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let raw = guard.value();
                if is_expired(raw, now_millis()) {
                    return Ok(None);
                }
                Ok(Some(Record {
                    key: key.to_string(),
                    value: payload(key, raw)?.to_vec(),
                }))
            }
            None => Ok(None),
        }
    }

    fn read_prefix(&self, prefix: &str) -> StoreResult<Vec<Record>> {
        self.scan_prefix(prefix, |key, value| Record {
            key: key.to_string(),
            value: value.to_vec(),
        })
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.scan_prefix(prefix, |key, _| key.to_string())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = now_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            existed = match table.remove(key).map_err(map_err!(Write))? {
                Some(guard) => !is_expired(guard.value(), now),
                None => false,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "record deleted");
        Ok(existed)
    }
}

fn encode(value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
    let expires_at = ttl
        .map(|ttl| now_millis().saturating_add(ttl.as_millis() as u64).max(1))
        .unwrap_or(0);
    let mut buf = Vec::with_capacity(HEADER_LEN + value.len());
    buf.extend_from_slice(&expires_at.to_be_bytes());
    buf.extend_from_slice(value);
    buf
}

fn expires_at(raw: &[u8]) -> u64 {
    raw.get(..HEADER_LEN)
        .and_then(|header| header.try_into().ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0)
}

fn is_expired(raw: &[u8], now: u64) -> bool {
    let at = expires_at(raw);
    at != 0 && at <= now
}

fn payload<'a>(key: &str, raw: &'a [u8]) -> StoreResult<&'a [u8]> {
    raw.get(HEADER_LEN..)
        .ok_or_else(|| StoreError::Corrupt(key.to_string()))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
