//! Service model shared across Corral crates.
//!
//! These types travel through the durable store as JSON (service records
//! and events) and through the runtime contract as plain values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Namespace used when a caller does not set one.
pub const DEFAULT_NAMESPACE: &str = "micro";

/// Version used when a caller does not set one.
pub const DEFAULT_VERSION: &str = "latest";

/// Metadata key carrying the observed status of a service.
pub const METADATA_STATUS: &str = "status";

/// Metadata key carrying the last observed error of a service.
pub const METADATA_ERROR: &str = "error";

/// Status recorded while a create or update is being applied.
pub const STATUS_STARTING: &str = "starting";

/// Status recorded when applying a command or running the workload failed.
pub const STATUS_ERROR: &str = "error";

// ── Service ───────────────────────────────────────────────────────

/// A workload known to the manager, identified by (namespace, name, version).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Where the workload comes from (git URL, blob reference, local path).
    #[serde(default)]
    pub source: String,
    /// Free-form metadata. The manager writes `status` and `error` here on read.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Service {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// `name:version`, the key used for statuses and live-set matching.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    /// Fill in the default version when none was given.
    pub fn with_default_version(mut self) -> Self {
        if self.version.is_empty() {
            self.version = DEFAULT_VERSION.to_string();
        }
        self
    }
}

// ── Create options ────────────────────────────────────────────────

/// How a service should be launched. Persisted next to the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateOptions {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub command: Vec<String>,
    /// Environment entries formatted `K=V`.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

impl CreateOptions {
    /// Options scoped to a namespace, everything else empty.
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn namespace_or_default(&self) -> &str {
        if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        }
    }
}

// ── Events ────────────────────────────────────────────────────────

/// Kind of command carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Delete => "delete",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command to apply a service change to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub service: Service,
    #[serde(default)]
    pub options: Option<CreateOptions>,
}

impl Event {
    /// Namespace the event applies to.
    pub fn namespace(&self) -> &str {
        self.options
            .as_ref()
            .map(CreateOptions::namespace_or_default)
            .unwrap_or(DEFAULT_NAMESPACE)
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Observed runtime status of a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceStatus {
    pub status: String,
    #[serde(default)]
    pub error: String,
}

impl ServiceStatus {
    pub fn new(status: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            error: error.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(STATUS_ERROR, message)
    }

    /// Status as reported by a runtime through service metadata.
    ///
    /// Returns `None` when the runtime reported neither a status nor an error.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Option<Self> {
        let status = metadata.get(METADATA_STATUS);
        let error = metadata.get(METADATA_ERROR);
        if status.is_none() && error.is_none() {
            return None;
        }
        Some(Self {
            status: status.cloned().unwrap_or_default(),
            error: error.cloned().unwrap_or_default(),
        })
    }

    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

// ── Auth ──────────────────────────────────────────────────────────

/// Credentials issued to a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub secret: String,
}
