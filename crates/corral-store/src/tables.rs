//! redb table definitions for the Corral store.
//!
//! A single table holds every record. Keys are namespaced by prefix
//! (`service/`, `event/`, `claim/`, `processed/`, `status:`), so prefix scans
//! are range scans over this table.

use redb::TableDefinition;

/// All records, keyed by their full key. Values carry the expiry header.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
