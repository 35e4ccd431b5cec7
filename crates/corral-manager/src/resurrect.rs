//! Resurrector: reconcile registered services against the live runtime.
//!
//! Runs once when the manager starts, and on a ticker when
//! `reconcile_frequency` is set. Any registered service the runtime does
//! not report is created again with its persisted options, unless its last
//! apply left it in the error status. Tombstoned records get a fresh Delete
//! event instead.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use corral_core::{EventType, Service};

use crate::dispatch::DispatchQueue;
use crate::error::ManagerResult;
use crate::events::EventProcessor;
use crate::registry::ServiceRegistry;
use crate::runtime::{ReadOptions, Runtime, RuntimeError};
use crate::status::StatusCache;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResurrectionReport {
    pub recreated: usize,
    pub failed: usize,
    pub deletes_republished: usize,
    /// Records left alone because their cached status is an error.
    pub skipped_failed: usize,
    /// Namespaces skipped because the runtime could not be read.
    pub skipped_namespaces: usize,
}

#[derive(Clone)]
pub struct Resurrector {
    registry: ServiceRegistry,
    runtime: Arc<dyn Runtime>,
    statuses: StatusCache,
    processor: Arc<EventProcessor>,
    queue: DispatchQueue,
}

fn live_key(service: &Service) -> (String, String, String) {
    (
        service.name.clone(),
        service.version.clone(),
        service.source.clone(),
    )
}

impl Resurrector {
    pub fn new(
        registry: ServiceRegistry,
        runtime: Arc<dyn Runtime>,
        statuses: StatusCache,
        processor: Arc<EventProcessor>,
        queue: DispatchQueue,
    ) -> Self {
        Self {
            registry,
            runtime,
            statuses,
            processor,
            queue,
        }
    }

    /// One pass over every namespace.
    pub async fn resurrect_services(&self) -> ManagerResult<ResurrectionReport> {
        let mut report = ResurrectionReport::default();

        for namespace in self.registry.list_namespaces()? {
            let records = self.registry.list_records(&namespace, None, None)?;
            if records.is_empty() {
                continue;
            }

            let live: HashSet<_> = match self
                .runtime
                .read(ReadOptions::in_namespace(namespace.clone()))
                .await
            {
                Ok(services) => services.iter().map(live_key).collect(),
                Err(e) => {
                    // Without the live set every record would look lost.
                    warn!(%namespace, error = %e, "failed to read runtime services, skipping namespace");
                    report.skipped_namespaces += 1;
                    continue;
                }
            };

            for record in records {
                let service = &record.service;

                if record.is_deleting() {
                    let key = self
                        .processor
                        .record(EventType::Delete, service, &record.options)?;
                    self.queue.submit(key);
                    report.deletes_republished += 1;
                    continue;
                }

                if live.contains(&live_key(service)) {
                    continue;
                }

                // A failed apply waits for the next command.
                if self
                    .statuses
                    .get(&namespace, service)?
                    .is_some_and(|status| status.is_error())
                {
                    debug!(%namespace, service = %service.identity(), "service in error status, not resurrecting");
                    report.skipped_failed += 1;
                    continue;
                }

                match self.processor.create_in_runtime(service, &record.options).await {
                    Ok(()) => {
                        info!(%namespace, service = %service.identity(), "service resurrected");
                        report.recreated += 1;
                    }
                    Err(e) if e.is_runtime(RuntimeError::AlreadyExists) => {
                        debug!(%namespace, service = %service.identity(), "service already exists in runtime");
                    }
                    Err(e) => {
                        error!(%namespace, service = %service.identity(), error = %e, "failed to resurrect service");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            recreated = report.recreated,
            failed = report.failed,
            deletes_republished = report.deletes_republished,
            skipped_failed = report.skipped_failed,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Reconcile once, then on every `every` tick until shutdown.
    pub async fn run(&self, every: Option<Duration>, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.resurrect_services().await {
            warn!(error = %e, "reconciliation failed");
        }
        let Some(every) = every else { return };

        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; the pass above covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.resurrect_services().await {
                        warn!(error = %e, "reconciliation failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}
