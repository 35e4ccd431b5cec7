//! Event dispatch: an in-process queue of event keys drained by a bounded
//! pool of workers, plus the periodic sweep that re-submits events the
//! queue never saw (published by another replica, or lost to a restart).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::ManagerResult;
use crate::events::{EventProcessor, ProcessOutcome};

/// Sender side of the dispatch queue. Closed while the manager is stopped.
#[derive(Clone, Default)]
pub struct DispatchQueue {
    sender: Arc<RwLock<Option<mpsc::UnboundedSender<String>>>>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the queue, replacing any previous receiver.
    pub fn open(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut sender) = self.sender.write() {
            *sender = Some(tx);
        }
        rx
    }

    /// Drop the sender. The dispatcher drains what is queued and exits.
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.write() {
            sender.take();
        }
    }

    pub fn is_open(&self) -> bool {
        self.sender.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Queue an event key. Returns false when the queue is closed.
    pub fn submit(&self, key: impl Into<String>) -> bool {
        let Ok(sender) = self.sender.read() else {
            return false;
        };
        match sender.as_ref() {
            Some(tx) => tx.send(key.into()).is_ok(),
            None => false,
        }
    }
}

/// Apply queued events with at most `limit` in flight.
///
/// Returns once the queue is closed and drained, or on shutdown. Workers
/// already running are awaited either way.
pub async fn run_dispatcher(
    processor: Arc<EventProcessor>,
    mut keys: mpsc::UnboundedReceiver<String>,
    limit: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut workers = JoinSet::new();
    info!(limit, "event dispatcher started");

    loop {
        tokio::select! {
            key = keys.recv() => {
                let Some(key) = key else { break };
                let Some(permit) = acquire(&permits, &mut shutdown).await else { break };
                let processor = processor.clone();
                workers.spawn(async move {
                    let outcome = processor.process(&key).await;
                    debug!(%key, ?outcome, "event dispatched");
                    drop(permit);
                });
                while workers.try_join_next().is_some() {}
            }
            _ = shutdown.changed() => break,
        }
    }

    while workers.join_next().await.is_some() {}
    info!("event dispatcher stopped");
}

/// Wait for a worker slot. `None` once shutdown is signalled.
async fn acquire(
    permits: &Arc<Semaphore>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        permit = permits.clone().acquire_owned() => permit.ok(),
        _ = shutdown.changed() => {
            debug!("shutdown while waiting for a dispatch slot");
            None
        }
    }
}

/// Periodically finds unprocessed events and feeds them to the dispatcher.
#[derive(Clone)]
pub struct EventSweeper {
    processor: Arc<EventProcessor>,
    queue: DispatchQueue,
    interval: Duration,
}

impl EventSweeper {
    pub fn new(processor: Arc<EventProcessor>, queue: DispatchQueue, interval: Duration) -> Self {
        Self {
            processor,
            queue,
            interval,
        }
    }

    /// One sweep over the event log. Returns the number of events handed
    /// on. With the queue closed, events are applied inline.
    pub async fn sweep_once(&self) -> ManagerResult<usize> {
        let mut submitted = 0;
        for key in self.processor.pending()? {
            if self.processor.is_processed(&key)? {
                continue;
            }
            if !self.queue.submit(key.clone()) {
                if let ProcessOutcome::Failed(e) = self.processor.process(&key).await {
                    debug!(%key, error = %e, "inline event apply failed");
                }
            }
            submitted += 1;
        }
        if submitted > 0 {
            debug!(submitted, "unprocessed events swept");
        }
        Ok(submitted)
    }

    /// Sweep until the shutdown signal fires. The first sweep runs at once.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "event sweeper started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "event sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("event sweeper shutting down");
                    break;
                }
            }
        }
    }
}
