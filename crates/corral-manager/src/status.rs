//! StatusCache and StatusPoller: observed runtime status of services.
//!
//! Statuses live in the process-local cache store under
//! `status:{namespace}:{name}:{version}`. The poller refreshes them from
//! the runtime once per `status_poll_frequency`; the event processor
//! overwrites them when applying an event. `Manager::read` merges them
//! into the returned service metadata.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use corral_core::{Service, ServiceStatus};
use corral_store::Store;

use crate::error::ManagerResult;
use crate::registry::ServiceRegistry;
use crate::runtime::{ReadOptions, Runtime};

/// Prefix of every status key written to the cache store.
pub const STATUS_PREFIX: &str = "status:";

fn status_key(namespace: &str, service: &Service) -> String {
    format!(
        "{STATUS_PREFIX}{namespace}:{}:{}",
        service.name, service.version
    )
}

/// Process-local map of `(namespace, name, version)` to observed status.
#[derive(Clone)]
pub struct StatusCache {
    cache: Arc<dyn Store>,
}

impl StatusCache {
    pub fn new(cache: Arc<dyn Store>) -> Self {
        Self { cache }
    }

    /// Overwrite the cached status of a service.
    pub fn put(&self, namespace: &str, service: &Service, status: &ServiceStatus) -> ManagerResult<()> {
        let value = serde_json::to_vec(status)?;
        self.cache.write(&status_key(namespace, service), &value, None)?;
        Ok(())
    }

    pub fn get(&self, namespace: &str, service: &Service) -> ManagerResult<Option<ServiceStatus>> {
        match self.cache.read(&status_key(namespace, service))? {
            Some(rec) => Ok(Some(serde_json::from_slice(&rec.value)?)),
            None => Ok(None),
        }
    }

    pub fn remove(&self, namespace: &str, service: &Service) -> ManagerResult<()> {
        self.cache.delete(&status_key(namespace, service))?;
        Ok(())
    }

    /// All statuses in a namespace keyed by `name:version`.
    pub fn list(&self, namespace: &str) -> ManagerResult<HashMap<String, ServiceStatus>> {
        let prefix = format!("{STATUS_PREFIX}{namespace}:");
        let mut statuses = HashMap::new();
        for rec in self.cache.read_prefix(&prefix)? {
            let status: ServiceStatus = serde_json::from_slice(&rec.value)?;
            statuses.insert(rec.key[prefix.len()..].to_string(), status);
        }
        Ok(statuses)
    }
}

/// Periodically samples the runtime and refreshes the [`StatusCache`].
#[derive(Clone)]
pub struct StatusPoller {
    registry: ServiceRegistry,
    runtime: Arc<dyn Runtime>,
    statuses: StatusCache,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        registry: ServiceRegistry,
        runtime: Arc<dyn Runtime>,
        statuses: StatusCache,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            runtime,
            statuses,
            interval,
        }
    }

    /// One refresh pass over every namespace in the registry.
    ///
    /// A failing namespace is logged and skipped. Returns the number of
    /// statuses written.
    pub async fn poll_once(&self) -> ManagerResult<usize> {
        let mut written = 0;
        for namespace in self.registry.list_namespaces()? {
            let services = match self
                .runtime
                .read(ReadOptions::in_namespace(namespace.clone()))
                .await
            {
                Ok(services) => services,
                Err(e) => {
                    warn!(%namespace, error = %e, "failed to read runtime services");
                    continue;
                }
            };

            for service in &services {
                let Some(status) = ServiceStatus::from_metadata(&service.metadata) else {
                    debug!(%namespace, service = %service.identity(), "runtime reported no status");
                    continue;
                };
                if let Err(e) = self.statuses.put(&namespace, service, &status) {
                    warn!(%namespace, service = %service.identity(), error = %e, "failed to cache status");
                    continue;
                }
                written += 1;
            }
        }
        debug!(written, "service statuses refreshed");
        Ok(written)
    }

    /// Poll until the shutdown signal fires. The first pass runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "status poller started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "status poll failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("status poller shutting down");
                    break;
                }
            }
        }
    }
}
