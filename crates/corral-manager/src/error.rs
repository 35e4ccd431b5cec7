//! Manager error types.

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors surfaced by the runtime manager.
///
/// Store and codec failures abort a Create/Update/Delete call before any
/// event is published. Runtime and auth failures only occur while events
/// are applied asynchronously; they end up in the status cache.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("service not found")]
    NotFound,

    #[error("invalid service: {0}")]
    InvalidService(String),

    #[error("store error: {0}")]
    Store(#[from] corral_store::StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("auth error: {0}")]
    Auth(String),

    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl ManagerError {
    /// Whether this wraps the given well-known runtime failure.
    pub fn is_runtime(&self, kind: RuntimeError) -> bool {
        match self {
            ManagerError::Runtime(err) => RuntimeError::matches(err, kind),
            _ => false,
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
