//! The Manager facade: the Runtime-shaped API callers use.
//!
//! Create/Update/Delete return as soon as the command is durably recorded
//! and queued; the runtime side effect happens on the dispatcher. Read is
//! answered from the registry merged with cached statuses.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use corral_core::{
    CreateOptions, EventType, METADATA_ERROR, METADATA_STATUS, ManagerConfig, Service,
};
use corral_store::Store;

use crate::dispatch::{DispatchQueue, EventSweeper, run_dispatcher};
use crate::error::{ManagerError, ManagerResult};
use crate::events::{EventProcessor, ProcessOutcome};
use crate::registry::ServiceRegistry;
use crate::resurrect::{ResurrectionReport, Resurrector};
use crate::runtime::{
    Auth, DeleteOptions, LogStream, LogsOptions, ReadOptions, Runtime, UpdateOptions,
};
use crate::status::{StatusCache, StatusPoller};

/// Handles of the loops spawned by [`Manager::start`].
struct Background {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Manager {
    config: ManagerConfig,
    runtime: Arc<dyn Runtime>,
    registry: ServiceRegistry,
    statuses: StatusCache,
    processor: Arc<EventProcessor>,
    queue: DispatchQueue,
    sweeper: EventSweeper,
    poller: StatusPoller,
    resurrector: Resurrector,
    background: Mutex<Option<Background>>,
}

impl Manager {
    /// Manager with the default configuration.
    ///
    /// `store` is the shared durable store (registry, events, claims);
    /// `cache` is process-local (processed-markers, statuses).
    pub fn new(
        store: Arc<dyn Store>,
        runtime: Arc<dyn Runtime>,
        auth: Arc<dyn Auth>,
        cache: Arc<dyn Store>,
    ) -> Self {
        Self::with_config(store, runtime, auth, cache, ManagerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn Store>,
        runtime: Arc<dyn Runtime>,
        auth: Arc<dyn Auth>,
        cache: Arc<dyn Store>,
        config: ManagerConfig,
    ) -> Self {
        let registry = ServiceRegistry::new(store.clone());
        let statuses = StatusCache::new(cache.clone());
        let processor = Arc::new(EventProcessor::new(
            store,
            cache,
            runtime.clone(),
            auth,
            &config,
        ));
        let queue = DispatchQueue::new();
        let sweeper = EventSweeper::new(
            processor.clone(),
            queue.clone(),
            config.event_poll_frequency(),
        );
        let poller = StatusPoller::new(
            registry.clone(),
            runtime.clone(),
            statuses.clone(),
            config.status_poll_frequency(),
        );
        let resurrector = Resurrector::new(
            registry.clone(),
            runtime.clone(),
            statuses.clone(),
            processor.clone(),
            queue.clone(),
        );

        Self {
            config,
            runtime,
            registry,
            statuses,
            processor,
            queue,
            sweeper,
            poller,
            resurrector,
            background: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ── Commands ──────────────────────────────────────────────────

    /// Record the desired service and publish a Create event.
    pub fn create(&self, service: &Service, options: CreateOptions) -> ManagerResult<()> {
        let service = validate(service, options.namespace_or_default())?;
        let record = self.registry.put(&service, &options)?;
        self.publish(EventType::Create, &service, &record.options)
    }

    /// Publish an Update event. The persisted options are left untouched.
    pub fn update(&self, service: &Service, options: UpdateOptions) -> ManagerResult<()> {
        let namespace = options.namespace_or_default();
        let service = validate(service, namespace)?;
        self.publish(
            EventType::Update,
            &service,
            &CreateOptions::in_namespace(namespace),
        )
    }

    /// Tombstone the record and publish a Delete event.
    ///
    /// The service disappears from [`Manager::read`] as soon as this
    /// returns; the record itself goes once the runtime confirmed.
    pub fn delete(&self, service: &Service, options: DeleteOptions) -> ManagerResult<()> {
        let namespace = options.namespace_or_default();
        let service = validate(service, namespace)?;
        self.registry.mark_deleting(namespace, &service)?;
        self.publish(
            EventType::Delete,
            &service,
            &CreateOptions::in_namespace(namespace),
        )
    }

    /// Registered services in a namespace with their cached status merged
    /// into `metadata`.
    ///
    /// Fails with [`ManagerError::NotFound`] when a service name was given
    /// and nothing matched.
    pub fn read(&self, options: ReadOptions) -> ManagerResult<Vec<Service>> {
        let namespace = options.namespace_or_default();
        let records = self.registry.list(
            namespace,
            options.service.as_deref(),
            options.version.as_deref(),
        )?;
        let statuses = self.statuses.list(namespace)?;

        let kind = options.kind.as_deref().filter(|k| !k.is_empty());
        let services: Vec<Service> = records
            .into_iter()
            .filter(|r| kind.is_none_or(|k| r.options.kind == k))
            .map(|r| {
                let mut service = r.service;
                if let Some(status) = statuses.get(&service.identity()) {
                    service
                        .metadata
                        .insert(METADATA_STATUS.to_string(), status.status.clone());
                    service
                        .metadata
                        .insert(METADATA_ERROR.to_string(), status.error.clone());
                }
                service
            })
            .collect();

        if services.is_empty() && options.service.as_deref().is_some_and(|n| !n.is_empty()) {
            return Err(ManagerError::NotFound);
        }
        Ok(services)
    }

    /// Pass-through to the managed runtime.
    pub async fn logs(&self, service: &Service, options: LogsOptions) -> ManagerResult<LogStream> {
        Ok(self.runtime.logs(service, options).await?)
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Start the managed runtime and the background loops. Idempotent.
    pub async fn start(&self) -> ManagerResult<()> {
        let mut background = self.background.lock().await;
        if background.is_some() {
            return Ok(());
        }

        self.runtime.start().await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let keys = self.queue.open();
        let mut tasks = Vec::with_capacity(4);

        tasks.push(tokio::spawn(run_dispatcher(
            self.processor.clone(),
            keys,
            self.config.max_concurrent_dispatch(),
            shutdown_rx.clone(),
        )));

        let sweeper = self.sweeper.clone();
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { sweeper.run(rx).await }));

        let poller = self.poller.clone();
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { poller.run(rx).await }));

        let resurrector = self.resurrector.clone();
        let every = self.config.reconcile_frequency();
        tasks.push(tokio::spawn(async move {
            resurrector.run(every, shutdown_rx).await
        }));

        *background = Some(Background { shutdown, tasks });
        info!(replica = %self.processor.replica_id(), "runtime manager started");
        Ok(())
    }

    /// Stop the background loops and the managed runtime. Idempotent.
    pub async fn stop(&self) -> ManagerResult<()> {
        let Some(background) = self.background.lock().await.take() else {
            return Ok(());
        };

        self.queue.close();
        let _ = background.shutdown.send(true);
        for task in background.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        self.runtime.stop().await?;
        info!("runtime manager stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.background.lock().await.is_some()
    }

    // ── Direct access to the background passes ────────────────────

    /// Apply one event now, outside the dispatcher.
    pub async fn process(&self, key: &str) -> ProcessOutcome {
        self.processor.process(key).await
    }

    /// Keys of events still in the store.
    pub fn pending_events(&self) -> ManagerResult<Vec<String>> {
        self.processor.pending()
    }

    /// One status refresh pass. Returns the number of statuses written.
    pub async fn poll_statuses(&self) -> ManagerResult<usize> {
        self.poller.poll_once().await
    }

    /// One reconciliation pass.
    pub async fn resurrect_services(&self) -> ManagerResult<ResurrectionReport> {
        self.resurrector.resurrect_services().await
    }

    fn publish(
        &self,
        event_type: EventType,
        service: &Service,
        options: &CreateOptions,
    ) -> ManagerResult<()> {
        let key = self.processor.record(event_type, service, options)?;
        if !self.queue.submit(key.clone()) {
            debug!(%key, "dispatcher not running, event left for the sweep");
        }
        Ok(())
    }
}

/// Characters that delimit key segments in the stores.
const RESERVED: [char; 2] = ['/', ':'];

/// Reject nameless services and key delimiters in the identity, and fill
/// in the default version.
fn validate(service: &Service, namespace: &str) -> ManagerResult<Service> {
    if service.name.trim().is_empty() {
        return Err(ManagerError::InvalidService("service name is empty".to_string()));
    }
    for (field, value) in [
        ("namespace", namespace),
        ("name", service.name.as_str()),
        ("version", service.version.as_str()),
    ] {
        if value.contains(RESERVED) {
            return Err(ManagerError::InvalidService(format!(
                "{field} {value:?} must not contain '/' or ':'"
            )));
        }
    }
    Ok(service.clone().with_default_version())
}
