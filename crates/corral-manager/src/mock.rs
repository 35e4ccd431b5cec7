//! In-memory runtime and auth used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use corral_core::{Account, Service};

use crate::runtime::{
    Auth, DeleteOptions, GenerateOptions, LogRecord, LogStream, LogsOptions, ReadOptions, Runtime,
    RuntimeCreateOptions, RuntimeError, UpdateOptions,
};

#[derive(Default)]
struct RuntimeState {
    live: HashMap<String, Vec<Service>>,
    failing_reads: HashSet<String>,
    create_error: Option<String>,
    delete_error: Option<String>,
    delete_not_found: bool,
    created: Vec<(Service, RuntimeCreateOptions)>,
}

#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<RuntimeState>,
    creates: AtomicUsize,
    reads: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_live(&self, namespace: &str, service: Service) {
        let mut state = self.state.lock().unwrap();
        state.live.entry(namespace.to_string()).or_default().push(service);
    }

    pub fn fail_read_in(&self, namespace: &str) {
        self.state.lock().unwrap().failing_reads.insert(namespace.to_string());
    }

    pub fn fail_create(&self, message: &str) {
        self.state.lock().unwrap().create_error = Some(message.to_string());
    }

    pub fn fail_delete(&self, message: &str) {
        self.state.lock().unwrap().delete_error = Some(message.to_string());
    }

    pub fn delete_reports_not_found(&self) {
        self.state.lock().unwrap().delete_not_found = true;
    }

    pub fn live(&self, namespace: &str) -> Vec<Service> {
        self.state
            .lock()
            .unwrap()
            .live
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    pub fn created(&self) -> Vec<(Service, RuntimeCreateOptions)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Create, update and delete calls combined.
    pub fn total_calls(&self) -> usize {
        self.create_count() + self.update_count() + self.delete_count()
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn create(&self, service: &Service, options: RuntimeCreateOptions) -> anyhow::Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.created.push((service.clone(), options.clone()));
        if let Some(msg) = &state.create_error {
            anyhow::bail!("{msg}");
        }
        let live = state.live.entry(options.namespace).or_default();
        if live
            .iter()
            .any(|s| s.name == service.name && s.version == service.version)
        {
            return Err(RuntimeError::AlreadyExists.into());
        }
        live.push(service.clone());
        Ok(())
    }

    async fn read(&self, options: ReadOptions) -> anyhow::Result<Vec<Service>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let namespace = options.namespace_or_default();
        if state.failing_reads.contains(namespace) {
            anyhow::bail!("namespace {namespace} unavailable");
        }
        let services = state.live.get(namespace).cloned().unwrap_or_default();
        Ok(services
            .into_iter()
            .filter(|s| options.service.as_ref().is_none_or(|n| &s.name == n))
            .filter(|s| options.version.as_ref().is_none_or(|v| &s.version == v))
            .collect())
    }

    async fn update(&self, _service: &Service, _options: UpdateOptions) -> anyhow::Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, service: &Service, options: DeleteOptions) -> anyhow::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(msg) = &state.delete_error {
            anyhow::bail!("{msg}");
        }
        if state.delete_not_found {
            return Err(RuntimeError::NotFound.into());
        }
        if let Some(live) = state.live.get_mut(options.namespace_or_default()) {
            live.retain(|s| !(s.name == service.name && s.version == service.version));
        }
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logs(&self, service: &Service, _options: LogsOptions) -> anyhow::Result<LogStream> {
        let (tx, stream) = LogStream::channel(1);
        let _ = tx.try_send(LogRecord {
            message: format!("{} started", service.name),
            ..LogRecord::default()
        });
        Ok(stream)
    }
}

#[derive(Default)]
pub struct MockAuth {
    error: Mutex<Option<String>>,
    requests: Mutex<Vec<(String, GenerateOptions)>>,
}

impl MockAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn last_request(&self) -> Option<(String, GenerateOptions)> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Auth for MockAuth {
    async fn generate(&self, name: &str, options: GenerateOptions) -> anyhow::Result<Account> {
        self.requests
            .lock()
            .unwrap()
            .push((name.to_string(), options));
        if let Some(msg) = self.error.lock().unwrap().as_ref() {
            anyhow::bail!("{msg}");
        }
        Ok(Account {
            id: format!("{name}-id"),
            secret: format!("{name}-secret"),
        })
    }
}
