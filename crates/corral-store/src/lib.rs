//! corral-store: the key/value store the runtime manager persists into.
//!
//! The [`Store`] trait is the contract the manager consumes: upsert with an
//! optional TTL, atomic create-if-absent, exact and prefix reads, key
//! listing and delete. [`RedbStore`] implements it on top of
//! [redb](https://docs.rs/redb), either on disk (the shared durable store)
//! or in memory (the process-local cache).
//!
//! # Record layout
//!
//! Every value is prefixed with an 8-byte big-endian expiry timestamp in
//! unix milliseconds (`0` = never expires). Expired records are invisible
//! to reads immediately and removed physically by
//! [`RedbStore::purge_expired`] or when overwritten.

pub mod error;
pub mod redb_store;
pub mod store;
pub mod tables;

/// File name of the durable store inside a data directory.
pub const STORE_FILE: &str = "corral.redb";

pub use error::{StoreError, StoreResult};
pub use redb_store::RedbStore;
pub use store::{Record, Store};
