//! ServiceRegistry: the durable catalog of what should be running.
//!
//! One record per (namespace, name, version), stored as JSON under
//! `service/{namespace}/{name}:{version}`. Deleting a service first turns
//! its record into a tombstone (`state = deleting`); the record is only
//! removed once the runtime confirmed the delete.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use corral_core::{CreateOptions, DEFAULT_NAMESPACE, Service};
use corral_store::Store;

use crate::error::ManagerResult;

/// Prefix of every service record key.
pub const SERVICE_PREFIX: &str = "service/";

/// Build the store key for a service record.
pub fn service_key(namespace: &str, name: &str, version: &str) -> String {
    format!("{SERVICE_PREFIX}{namespace}/{name}:{version}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Active,
    /// Delete requested, runtime teardown not confirmed yet.
    Deleting,
}

/// The persisted desired state of one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRecord {
    pub service: Service,
    pub options: CreateOptions,
    #[serde(default)]
    pub state: RecordState,
    /// Unix timestamp (seconds) when the record was first written.
    #[serde(default)]
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last write.
    #[serde(default)]
    pub updated_at: u64,
}

impl ServiceRecord {
    pub fn namespace(&self) -> &str {
        self.options.namespace_or_default()
    }

    pub fn table_key(&self) -> String {
        service_key(self.namespace(), &self.service.name, &self.service.version)
    }

    pub fn is_deleting(&self) -> bool {
        self.state == RecordState::Deleting
    }
}

/// Desired-state catalog on top of the shared store.
#[derive(Clone)]
pub struct ServiceRegistry {
    store: Arc<dyn Store>,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Insert or replace the record for a service. Durable once this returns.
    pub fn put(&self, service: &Service, options: &CreateOptions) -> ManagerResult<ServiceRecord> {
        let namespace = options.namespace_or_default();
        let now = epoch_secs();
        let created_at = self
            .get(namespace, &service.name, &service.version)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let mut options = options.clone();
        options.namespace = namespace.to_string();
        let record = ServiceRecord {
            service: service.clone(),
            options,
            state: RecordState::Active,
            created_at,
            updated_at: now,
        };
        self.write(&record)?;
        Ok(record)
    }

    /// Read one record, tombstones included.
    pub fn get(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> ManagerResult<Option<ServiceRecord>> {
        match self.store.read(&service_key(namespace, name, version))? {
            Some(rec) => Ok(Some(serde_json::from_slice(&rec.value)?)),
            None => Ok(None),
        }
    }

    /// Live records in a namespace, optionally filtered by name and version.
    pub fn list(
        &self,
        namespace: &str,
        name: Option<&str>,
        version: Option<&str>,
    ) -> ManagerResult<Vec<ServiceRecord>> {
        let mut records = self.list_records(namespace, name, version)?;
        records.retain(|r| !r.is_deleting());
        Ok(records)
    }

    /// Every record in a namespace, tombstones included.
    pub fn list_records(
        &self,
        namespace: &str,
        name: Option<&str>,
        version: Option<&str>,
    ) -> ManagerResult<Vec<ServiceRecord>> {
        let name = name.filter(|n| !n.is_empty());
        let version = version.filter(|v| !v.is_empty());

        let mut prefix = format!("{SERVICE_PREFIX}{namespace}/");
        if let Some(name) = name {
            prefix.push_str(name);
            prefix.push(':');
        }

        let mut records = Vec::new();
        for rec in self.store.read_prefix(&prefix)? {
            let record: ServiceRecord = serde_json::from_slice(&rec.value)?;
            if record.namespace() != namespace {
                continue;
            }
            if name.is_some_and(|n| record.service.name != n) {
                continue;
            }
            if version.is_some_and(|v| record.service.version != v) {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Turn a record into a tombstone, creating one if the service is unknown.
    pub fn mark_deleting(&self, namespace: &str, service: &Service) -> ManagerResult<ServiceRecord> {
        let now = epoch_secs();
        let mut record = self
            .get(namespace, &service.name, &service.version)?
            .unwrap_or_else(|| ServiceRecord {
                service: service.clone(),
                options: CreateOptions::in_namespace(namespace),
                state: RecordState::Active,
                created_at: now,
                updated_at: now,
            });
        record.state = RecordState::Deleting;
        record.updated_at = now;
        self.write(&record)?;
        Ok(record)
    }

    /// Delete a record by exact key. Returns true if it existed.
    pub fn remove(&self, namespace: &str, service: &Service) -> ManagerResult<bool> {
        let key = service_key(namespace, &service.name, &service.version);
        let existed = self.store.delete(&key)?;
        debug!(%key, existed, "service record removed");
        Ok(existed)
    }

    /// Remove a record only if it is still a tombstone.
    ///
    /// A Create issued after the Delete revives the record; that record
    /// must survive the late delete confirmation.
    pub fn remove_if_deleting(&self, namespace: &str, service: &Service) -> ManagerResult<bool> {
        match self.get(namespace, &service.name, &service.version)? {
            Some(record) if record.is_deleting() => self.remove(namespace, service),
            _ => Ok(false),
        }
    }

    /// Namespaces with at least one record. Falls back to the default
    /// namespace when the registry is empty.
    pub fn list_namespaces(&self) -> ManagerResult<Vec<String>> {
        let mut namespaces = BTreeSet::new();
        for key in self.store.list(SERVICE_PREFIX)? {
            // key is formatted 'service/{namespace}/{name}:{version}'
            match key[SERVICE_PREFIX.len()..].split_once('/') {
                Some((ns, _)) if !ns.is_empty() => {
                    namespaces.insert(ns.to_string());
                }
                _ => warn!(%key, "skipping malformed service key"),
            }
        }
        if namespaces.is_empty() {
            return Ok(vec![DEFAULT_NAMESPACE.to_string()]);
        }
        Ok(namespaces.into_iter().collect())
    }

    fn write(&self, record: &ServiceRecord) -> ManagerResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record)?;
        self.store.write(&key, &value, None)?;
        debug!(%key, state = ?record.state, "service record stored");
        Ok(())
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
