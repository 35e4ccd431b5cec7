//! Contracts for the collaborators the manager drives: the execution
//! runtime that actually runs workloads, and the auth system that issues
//! service credentials.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use corral_core::{Account, DEFAULT_NAMESPACE, Service};

/// Well-known failures a runtime may report inside its `anyhow::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("service already exists")]
    AlreadyExists,

    #[error("service not found")]
    NotFound,
}

impl RuntimeError {
    /// Whether `err` is (or wraps) this runtime failure.
    pub fn matches(err: &anyhow::Error, kind: RuntimeError) -> bool {
        err.downcast_ref::<RuntimeError>() == Some(&kind)
    }
}

fn or_default_namespace(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}

// ── Options ───────────────────────────────────────────────────────

/// Fully resolved launch options handed to [`Runtime::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCreateOptions {
    pub namespace: String,
    pub image: String,
    pub kind: String,
    pub args: Vec<String>,
    pub command: Vec<String>,
    /// Environment entries formatted `K=V`.
    pub env: Vec<String>,
    pub secrets: HashMap<String, String>,
}

/// Filter for [`Runtime::read`] and `Manager::read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub namespace: String,
    pub service: Option<String>,
    pub version: Option<String>,
    pub kind: Option<String>,
}

impl ReadOptions {
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_service(mut self, name: impl Into<String>) -> Self {
        self.service = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn namespace_or_default(&self) -> &str {
        or_default_namespace(&self.namespace)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub namespace: String,
}

impl UpdateOptions {
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace_or_default(&self) -> &str {
        or_default_namespace(&self.namespace)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub namespace: String,
}

impl DeleteOptions {
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace_or_default(&self) -> &str {
        or_default_namespace(&self.namespace)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsOptions {
    pub namespace: String,
    /// Number of trailing records to return, all when unset.
    pub count: Option<usize>,
    /// Keep the stream open for new records.
    pub stream: bool,
}

/// Options for [`Auth::generate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub issuer: String,
    pub scopes: Vec<String>,
    pub account_type: String,
}

// ── Logs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRecord {
    pub message: String,
    pub metadata: HashMap<String, String>,
}

/// Log records produced by a runtime for one service.
#[derive(Debug)]
pub struct LogStream {
    records: mpsc::Receiver<LogRecord>,
}

impl LogStream {
    /// Create a stream and the sender a runtime feeds it through.
    pub fn channel(buffer: usize) -> (mpsc::Sender<LogRecord>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { records: rx })
    }

    /// Next record, or `None` once the runtime closed the stream.
    pub async fn next(&mut self) -> Option<LogRecord> {
        self.records.recv().await
    }

    /// Stop receiving; pending records are dropped.
    pub fn stop(&mut self) {
        self.records.close();
    }
}

// ── Traits ────────────────────────────────────────────────────────

/// An execution runtime (local process spawner, container orchestrator, ...).
///
/// Services are identified by (namespace, name, version). Runtimes report
/// observed status through the `status` / `error` metadata keys of the
/// services returned by [`Runtime::read`].
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn create(&self, service: &Service, options: RuntimeCreateOptions) -> anyhow::Result<()>;

    async fn read(&self, options: ReadOptions) -> anyhow::Result<Vec<Service>>;

    async fn update(&self, service: &Service, options: UpdateOptions) -> anyhow::Result<()>;

    async fn delete(&self, service: &Service, options: DeleteOptions) -> anyhow::Result<()>;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    async fn logs(&self, service: &Service, options: LogsOptions) -> anyhow::Result<LogStream>;
}

/// Issues credentials to services.
#[async_trait]
pub trait Auth: Send + Sync {
    async fn generate(&self, name: &str, options: GenerateOptions) -> anyhow::Result<Account>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_downcast() {
        let err: anyhow::Error = RuntimeError::AlreadyExists.into();
        assert!(RuntimeError::matches(&err, RuntimeError::AlreadyExists));
        assert!(!RuntimeError::matches(&err, RuntimeError::NotFound));

        let other = anyhow::anyhow!("disk full");
        assert!(!RuntimeError::matches(&other, RuntimeError::NotFound));
    }

    #[test]
    fn read_options_builder() {
        let opts = ReadOptions::in_namespace("ns1")
            .with_service("foo")
            .with_version("1.0.0");
        assert_eq!(opts.namespace_or_default(), "ns1");
        assert_eq!(opts.service.as_deref(), Some("foo"));
        assert_eq!(opts.version.as_deref(), Some("1.0.0"));
        assert_eq!(ReadOptions::default().namespace_or_default(), DEFAULT_NAMESPACE);
    }

    #[tokio::test]
    async fn log_stream_ends_when_sender_drops() {
        let (tx, mut stream) = LogStream::channel(4);
        tx.send(LogRecord {
            message: "listening on :8080".to_string(),
            ..LogRecord::default()
        })
        .await
        .unwrap();
        drop(tx);

        assert_eq!(stream.next().await.unwrap().message, "listening on :8080");
        assert!(stream.next().await.is_none());
    }
}
