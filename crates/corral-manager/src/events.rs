//! EventLog and EventProcessor: the durable, idempotent command queue.
//!
//! Every Create/Update/Delete call is recorded as an [`Event`] under
//! `event/{uuid}` with a TTL of `event_ttl`. Events are applied to the
//! runtime by [`EventProcessor::process`], reached both from the immediate
//! dispatch after publishing and from the periodic sweep.
//!
//! # Deduplication
//!
//! ```text
//! process(key)
//!   ├── in-flight set         (same key already running in this process)
//!   ├── processed/{key}       (cache store, TTL 2×event_ttl)
//!   ├── claim/{key}           (shared store, write_if_absent, TTL claim_ttl)
//!   ├── dispatch to runtime
//!   └── processed/{key} + claim/{key} rewritten with TTL 2×event_ttl
//! ```
//!
//! A worker that dies mid-dispatch leaves only the short claim behind; once
//! it expires the sweep applies the event again.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use corral_core::{
    CreateOptions, Event, EventType, ManagerConfig, STATUS_STARTING, Service, ServiceStatus,
};
use corral_store::Store;

use crate::error::{ManagerError, ManagerResult};
use crate::registry::ServiceRegistry;
use crate::runtime::{
    Auth, DeleteOptions, GenerateOptions, Runtime, RuntimeCreateOptions, RuntimeError,
    UpdateOptions,
};
use crate::status::StatusCache;

/// Prefix of every event key in the shared store.
pub const EVENT_PREFIX: &str = "event/";

/// Prefix of processed-markers in the cache store.
pub const PROCESSED_PREFIX: &str = "processed/";

/// Prefix of dispatch claims in the shared store.
pub const CLAIM_PREFIX: &str = "claim/";

/// Secret carrying the generated account ID.
pub const AUTH_ID_SECRET: &str = "MICRO_AUTH_ID";

/// Secret carrying the generated account secret.
pub const AUTH_SECRET_SECRET: &str = "MICRO_AUTH_SECRET";

/// What a call to [`EventProcessor::process`] ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The event was dispatched and the runtime accepted it.
    Applied,
    /// The event was dispatched and the runtime (or auth) failed.
    Failed(String),
    /// A processed-marker exists; nothing was done.
    AlreadyProcessed,
    /// Another worker holds the claim for this event.
    Claimed,
    /// The same key is being processed by this process right now.
    InFlight,
    /// The event expired, was deleted, or could not be decoded.
    Missing,
}

/// Removes a key from the in-flight set when processing ends.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

/// Records events and applies them to the runtime.
pub struct EventProcessor {
    store: Arc<dyn Store>,
    cache: Arc<dyn Store>,
    registry: ServiceRegistry,
    statuses: StatusCache,
    runtime: Arc<dyn Runtime>,
    auth: Arc<dyn Auth>,
    event_ttl: Duration,
    claim_ttl: Duration,
    profile: Vec<String>,
    /// Written into claims so an operator can tell which manager holds one.
    replica_id: String,
    in_flight: Mutex<HashSet<String>>,
}

impl EventProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Store>,
        runtime: Arc<dyn Runtime>,
        auth: Arc<dyn Auth>,
        config: &ManagerConfig,
    ) -> Self {
        Self {
            registry: ServiceRegistry::new(store.clone()),
            statuses: StatusCache::new(cache.clone()),
            store,
            cache,
            runtime,
            auth,
            event_ttl: config.event_ttl(),
            claim_ttl: config.claim_ttl(),
            profile: service_profile(config),
            replica_id: Uuid::new_v4().to_string(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Durably record an event. Returns its key (`event/{id}`).
    ///
    /// Dispatching the key is the caller's job; the sweep picks it up
    /// regardless.
    pub fn record(
        &self,
        event_type: EventType,
        service: &Service,
        options: &CreateOptions,
    ) -> ManagerResult<String> {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            event_type,
            service: service.clone(),
            options: Some(options.clone()),
        };
        let key = format!("{EVENT_PREFIX}{}", event.id);
        let value = serde_json::to_vec(&event)?;
        self.store.write(&key, &value, Some(self.event_ttl))?;
        debug!(%key, %event_type, service = %service.identity(), "event recorded");
        Ok(key)
    }

    /// Keys of every unexpired event in the shared store.
    pub fn pending(&self) -> ManagerResult<Vec<String>> {
        Ok(self.store.list(EVENT_PREFIX)?)
    }

    /// Whether this process already handled the event.
    pub fn is_processed(&self, key: &str) -> ManagerResult<bool> {
        Ok(self.cache.read(&processed_key(key))?.is_some())
    }

    /// Apply the event stored under `key` at most once.
    pub async fn process(&self, key: &str) -> ProcessOutcome {
        let Some(_guard) = self.enter(key) else {
            debug!(%key, "event already in flight");
            return ProcessOutcome::InFlight;
        };

        match self.is_processed(key) {
            Ok(true) => return ProcessOutcome::AlreadyProcessed,
            Ok(false) => {}
            Err(e) => {
                warn!(%key, error = %e, "failed to check processed marker");
                return ProcessOutcome::Missing;
            }
        }

        let event = match self.load(key) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(%key, "event no longer in store");
                return ProcessOutcome::Missing;
            }
            Err(e) => {
                warn!(%key, error = %e, "failed to load event");
                self.mark_processed(key);
                return ProcessOutcome::Missing;
            }
        };

        match self.store.write_if_absent(
            &claim_key(key),
            self.replica_id.as_bytes(),
            Some(self.claim_ttl),
        ) {
            Ok(true) => {}
            Ok(false) => {
                debug!(%key, "event claimed by another worker");
                return ProcessOutcome::Claimed;
            }
            Err(e) => {
                warn!(%key, error = %e, "failed to claim event");
                return ProcessOutcome::Claimed;
            }
        }

        let namespace = event.namespace().to_string();
        info!(
            %key,
            event_type = %event.event_type,
            service = %event.service.identity(),
            %namespace,
            "processing event"
        );

        let result = self.dispatch(&event, &namespace).await;
        let outcome = match result {
            Ok(()) => ProcessOutcome::Applied,
            Err(e) => {
                error!(
                    %key,
                    event_type = %event.event_type,
                    service = %event.service.identity(),
                    %namespace,
                    error = %e,
                    "failed to apply event"
                );
                if event.event_type != EventType::Delete {
                    let status = ServiceStatus::error(e.to_string());
                    if let Err(e) = self.statuses.put(&namespace, &event.service, &status) {
                        warn!(%key, error = %e, "failed to cache error status");
                    }
                }
                ProcessOutcome::Failed(e.to_string())
            }
        };

        self.mark_processed(key);
        outcome
    }

    /// Create a service in the runtime with credentials and the computed env.
    ///
    /// Shared by event processing and resurrection.
    pub async fn create_in_runtime(
        &self,
        service: &Service,
        options: &CreateOptions,
    ) -> ManagerResult<()> {
        let namespace = options.namespace_or_default();
        let account = self.generate_account(service, namespace).await?;

        let mut secrets = options.secrets.clone();
        if !account.id.is_empty() && !account.secret.is_empty() {
            secrets.insert(AUTH_ID_SECRET.to_string(), account.id);
            secrets.insert(AUTH_SECRET_SECRET.to_string(), account.secret);
        }

        let create = RuntimeCreateOptions {
            namespace: namespace.to_string(),
            image: options.image.clone(),
            kind: options.kind.clone(),
            args: options.args.clone(),
            command: options.command.clone(),
            env: runtime_env(service, options, &self.profile),
            secrets,
        };
        self.runtime.create(service, create).await?;
        Ok(())
    }

    async fn dispatch(&self, event: &Event, namespace: &str) -> ManagerResult<()> {
        match event.event_type {
            EventType::Delete => {
                let deleted = self
                    .runtime
                    .delete(&event.service, DeleteOptions::in_namespace(namespace))
                    .await;
                match deleted {
                    Ok(()) => {}
                    Err(e) if RuntimeError::matches(&e, RuntimeError::NotFound) => {
                        debug!(service = %event.service.identity(), "service already gone from runtime");
                    }
                    Err(e) => return Err(e.into()),
                }
                self.registry.remove_if_deleting(namespace, &event.service)?;
                self.statuses.remove(namespace, &event.service)?;
            }
            EventType::Update => {
                self.runtime
                    .update(&event.service, UpdateOptions::in_namespace(namespace))
                    .await?;
                self.cache_starting(namespace, &event.service);
            }
            EventType::Create => {
                let mut options = event.options.clone().unwrap_or_default();
                options.namespace = namespace.to_string();
                match self.create_in_runtime(&event.service, &options).await {
                    Ok(()) => {}
                    Err(e) if e.is_runtime(RuntimeError::AlreadyExists) => {
                        debug!(service = %event.service.identity(), "service already exists in runtime");
                    }
                    Err(e) => return Err(e),
                }
                self.cache_starting(namespace, &event.service);
            }
        }
        Ok(())
    }

    async fn generate_account(
        &self,
        service: &Service,
        namespace: &str,
    ) -> ManagerResult<corral_core::Account> {
        let name = format!("{}-{}", service.name, service.version);
        let options = GenerateOptions {
            issuer: namespace.to_string(),
            scopes: vec!["service".to_string()],
            account_type: "service".to_string(),
        };
        match self.auth.generate(&name, options).await {
            Ok(account) => {
                debug!(account = %account.id, secret_len = account.secret.len(), "generated service account");
                Ok(account)
            }
            Err(e) => {
                warn!(account = %name, error = %e, "failed to generate service account");
                Err(ManagerError::Auth(e.to_string()))
            }
        }
    }

    fn cache_starting(&self, namespace: &str, service: &Service) {
        let status = ServiceStatus::new(STATUS_STARTING, "");
        if let Err(e) = self.statuses.put(namespace, service, &status) {
            warn!(service = %service.identity(), error = %e, "failed to cache status");
        }
    }

    fn enter(&self, key: &str) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            key: key.to_string(),
        })
    }

    fn load(&self, key: &str) -> ManagerResult<Option<Event>> {
        match self.store.read(key)? {
            Some(rec) => Ok(Some(serde_json::from_slice(&rec.value)?)),
            None => Ok(None),
        }
    }

    fn mark_processed(&self, key: &str) {
        let ttl = Some(self.event_ttl * 2);
        if let Err(e) = self.cache.write(&processed_key(key), &[], ttl) {
            warn!(%key, error = %e, "failed to write processed marker");
        }
        if let Err(e) = self
            .store
            .write(&claim_key(key), self.replica_id.as_bytes(), ttl)
        {
            warn!(%key, error = %e, "failed to extend event claim");
        }
    }
}

fn processed_key(event_key: &str) -> String {
    format!("{PROCESSED_PREFIX}{event_key}")
}

fn claim_key(event_key: &str) -> String {
    format!("{CLAIM_PREFIX}{event_key}")
}

/// Profile entries every service starts from: no client profile of its
/// own, the manager's proxy if one is configured, then the configured
/// profile.
fn service_profile(config: &ManagerConfig) -> Vec<String> {
    let mut profile = vec!["MICRO_PROFILE=".to_string()];
    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
        profile.push(format!("MICRO_PROXY={proxy}"));
    }
    profile.extend(config.profile.iter().cloned());
    profile
}

/// Environment for a new service: the profile, then the user's `K=V`
/// entries, later entries winning. Identity and namespace are set last and
/// cannot be overridden.
pub fn runtime_env(service: &Service, options: &CreateOptions, profile: &[String]) -> Vec<String> {
    let mut env = BTreeMap::new();
    for entry in profile.iter().chain(&options.env) {
        // values may themselves contain '='
        if let Some((k, v)) = entry.split_once('=') {
            if !k.is_empty() {
                env.insert(k.to_string(), v.to_string());
            }
        }
    }

    env.insert("MICRO_SERVICE_NAME".to_string(), service.name.clone());
    env.insert("MICRO_SERVICE_VERSION".to_string(), service.version.clone());
    env.insert(
        "MICRO_NAMESPACE".to_string(),
        options.namespace_or_default().to_string(),
    );

    env.into_iter().map(|(k, v)| format!("{k}={v}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAuth, MockRuntime};
    use corral_store::RedbStore;

    struct Fixture {
        store: Arc<dyn Store>,
        cache: Arc<dyn Store>,
        runtime: Arc<MockRuntime>,
        auth: Arc<MockAuth>,
        processor: EventProcessor,
    }

    fn fixture_with(config: ManagerConfig) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(RedbStore::open_in_memory().unwrap());
        let cache: Arc<dyn Store> = Arc::new(RedbStore::open_in_memory().unwrap());
        let runtime = Arc::new(MockRuntime::new());
        let auth = Arc::new(MockAuth::new());
        let processor = EventProcessor::new(
            store.clone(),
            cache.clone(),
            runtime.clone(),
            auth.clone(),
            &config,
        );
        Fixture {
            store,
            cache,
            runtime,
            auth,
            processor,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ManagerConfig::default())
    }

    fn foo() -> Service {
        Service::new("foo", "latest")
    }

    #[test]
    fn record_writes_event_under_uuid_key() {
        let f = fixture();
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();

        let id = key.strip_prefix(EVENT_PREFIX).unwrap();
        assert!(Uuid::parse_str(id).is_ok());

        let rec = f.store.read(&key).unwrap().unwrap();
        let event: Event = serde_json::from_slice(&rec.value).unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.event_type, EventType::Create);
        assert_eq!(event.namespace(), "ns1");
        assert_eq!(f.processor.pending().unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn create_is_applied_once() {
        let f = fixture();
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();

        assert_eq!(f.processor.process(&key).await, ProcessOutcome::Applied);
        assert_eq!(f.processor.process(&key).await, ProcessOutcome::AlreadyProcessed);
        assert_eq!(f.runtime.create_count(), 1);
        assert!(f.processor.is_processed(&key).unwrap());
    }

    #[tokio::test]
    async fn update_and_delete_are_applied_once() {
        let f = fixture();
        let opts = CreateOptions::in_namespace("ns1");

        let update = f.processor.record(EventType::Update, &foo(), &opts).unwrap();
        f.processor.process(&update).await;
        f.processor.process(&update).await;
        assert_eq!(f.runtime.update_count(), 1);

        let delete = f.processor.record(EventType::Delete, &foo(), &opts).unwrap();
        f.processor.process(&delete).await;
        f.processor.process(&delete).await;
        assert_eq!(f.runtime.delete_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_processing_dispatches_once() {
        let f = fixture();
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();

        let (a, b) = tokio::join!(f.processor.process(&key), f.processor.process(&key));
        assert!(a == ProcessOutcome::Applied || b == ProcessOutcome::Applied);
        assert_eq!(f.runtime.create_count(), 1);
    }

    #[tokio::test]
    async fn claim_in_shared_store_blocks_other_replicas() {
        let f = fixture();
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();

        // A second manager sharing the store but with its own cache.
        let other_cache: Arc<dyn Store> = Arc::new(RedbStore::open_in_memory().unwrap());
        let other = EventProcessor::new(
            f.store.clone(),
            other_cache,
            f.runtime.clone(),
            f.auth.clone(),
            &ManagerConfig::default(),
        );

        assert_eq!(f.processor.process(&key).await, ProcessOutcome::Applied);
        assert_eq!(other.process(&key).await, ProcessOutcome::Claimed);
        assert_eq!(f.runtime.create_count(), 1);
    }

    #[tokio::test]
    async fn expired_claim_allows_redelivery() {
        let f = fixture_with(ManagerConfig {
            claim_ttl: Some("20ms".to_string()),
            ..ManagerConfig::default()
        });
        let key = f
            .processor
            .record(EventType::Update, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();

        // Simulate a worker that claimed the event and died before dispatching.
        f.store
            .write(&claim_key(&key), b"dead-replica", Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(f.processor.process(&key).await, ProcessOutcome::Claimed);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.processor.process(&key).await, ProcessOutcome::Applied);
        assert_eq!(f.runtime.update_count(), 1);
    }

    #[tokio::test]
    async fn missing_event_is_a_noop() {
        let f = fixture();
        assert_eq!(
            f.processor.process("event/does-not-exist").await,
            ProcessOutcome::Missing
        );
        assert_eq!(f.runtime.total_calls(), 0);
    }

    #[tokio::test]
    async fn create_injects_credentials_and_env() {
        let f = fixture_with(ManagerConfig {
            profile: vec!["MICRO_REGISTRY=etcd".to_string()],
            ..ManagerConfig::default()
        });
        let mut secrets = std::collections::HashMap::new();
        secrets.insert("DB_PASSWORD".to_string(), "hunter2".to_string());
        let opts = CreateOptions {
            image: "foo:1".to_string(),
            kind: "service".to_string(),
            args: vec!["--verbose".to_string()],
            command: vec!["/bin/foo".to_string()],
            env: vec!["MICRO_REGISTRY=mdns".to_string(), "URL=a=b".to_string()],
            secrets,
            ..CreateOptions::in_namespace("ns1")
        };
        let key = f.processor.record(EventType::Create, &foo(), &opts).unwrap();
        f.processor.process(&key).await;

        let created = f.runtime.created();
        assert_eq!(created.len(), 1);
        let (srv, create) = &created[0];
        assert_eq!(srv, &foo());
        assert_eq!(create.namespace, "ns1");
        assert_eq!(create.image, "foo:1");
        assert_eq!(create.kind, "service");
        assert_eq!(create.args, vec!["--verbose"]);
        assert_eq!(create.command, vec!["/bin/foo"]);
        assert_eq!(create.secrets["DB_PASSWORD"], "hunter2");
        assert!(!create.secrets[AUTH_ID_SECRET].is_empty());
        assert!(!create.secrets[AUTH_SECRET_SECRET].is_empty());
        assert!(create.env.contains(&"MICRO_REGISTRY=mdns".to_string()));
        assert!(create.env.contains(&"URL=a=b".to_string()));
        assert!(create.env.contains(&"MICRO_NAMESPACE=ns1".to_string()));

        let (name, gen_opts) = f.auth.last_request().unwrap();
        assert_eq!(name, "foo-latest");
        assert_eq!(gen_opts.issuer, "ns1");
        assert_eq!(gen_opts.scopes, vec!["service"]);
    }

    #[tokio::test]
    async fn runtime_failure_is_recorded_as_status() {
        let f = fixture();
        f.runtime.fail_create("no capacity");
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();

        assert!(matches!(f.processor.process(&key).await, ProcessOutcome::Failed(_)));
        let status = StatusCache::new(f.cache.clone())
            .get("ns1", &foo())
            .unwrap()
            .unwrap();
        assert!(status.is_error());
        assert!(status.error.contains("no capacity"));

        // Marked processed regardless of the failure.
        assert_eq!(f.processor.process(&key).await, ProcessOutcome::AlreadyProcessed);
        assert_eq!(f.runtime.create_count(), 1);
    }

    #[tokio::test]
    async fn auth_failure_aborts_create() {
        let f = fixture();
        f.auth.fail("auth down");
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();

        let outcome = f.processor.process(&key).await;
        assert!(matches!(outcome, ProcessOutcome::Failed(msg) if msg.contains("auth down")));
        assert_eq!(f.runtime.create_count(), 0);
    }

    #[tokio::test]
    async fn successful_create_caches_starting_status() {
        let f = fixture();
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();
        f.processor.process(&key).await;

        let status = StatusCache::new(f.cache.clone())
            .get("ns1", &foo())
            .unwrap()
            .unwrap();
        assert_eq!(status.status, STATUS_STARTING);
    }

    #[tokio::test]
    async fn delete_removes_tombstone_after_runtime_confirms() {
        let f = fixture();
        let registry = ServiceRegistry::new(f.store.clone());
        let opts = CreateOptions::in_namespace("ns1");
        registry.put(&foo(), &opts).unwrap();
        registry.mark_deleting("ns1", &foo()).unwrap();

        let key = f.processor.record(EventType::Delete, &foo(), &opts).unwrap();
        assert_eq!(f.processor.process(&key).await, ProcessOutcome::Applied);
        assert!(registry.get("ns1", "foo", "latest").unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_tombstone() {
        let f = fixture();
        f.runtime.fail_delete("runtime unreachable");
        let registry = ServiceRegistry::new(f.store.clone());
        let opts = CreateOptions::in_namespace("ns1");
        registry.mark_deleting("ns1", &foo()).unwrap();

        let key = f.processor.record(EventType::Delete, &foo(), &opts).unwrap();
        assert!(matches!(f.processor.process(&key).await, ProcessOutcome::Failed(_)));
        assert!(registry.get("ns1", "foo", "latest").unwrap().unwrap().is_deleting());
    }

    #[tokio::test]
    async fn delete_of_unknown_runtime_service_succeeds() {
        let f = fixture();
        f.runtime.delete_reports_not_found();
        let key = f
            .processor
            .record(EventType::Delete, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();
        assert_eq!(f.processor.process(&key).await, ProcessOutcome::Applied);
    }

    #[test]
    fn runtime_env_precedence() {
        let srv = Service::new("foo", "1.0.0");
        let opts = CreateOptions {
            env: vec![
                "A=user".to_string(),
                "broken".to_string(),
                "B=first".to_string(),
                "B=second".to_string(),
                "MICRO_NAMESPACE=other".to_string(),
                "MICRO_SERVICE_NAME=bar".to_string(),
            ],
            ..CreateOptions::in_namespace("ns1")
        };
        let profile = vec![
            "A=profile".to_string(),
            "P=1".to_string(),
            "MICRO_SERVICE_VERSION=9.9.9".to_string(),
        ];

        let env = runtime_env(&srv, &opts, &profile);
        assert_eq!(
            env,
            vec![
                "A=user",
                "B=second",
                "MICRO_NAMESPACE=ns1",
                "MICRO_SERVICE_NAME=foo",
                "MICRO_SERVICE_VERSION=1.0.0",
                "P=1",
            ]
        );
    }

    #[tokio::test]
    async fn services_get_cleared_profile_and_proxy() {
        let f = fixture_with(ManagerConfig {
            proxy: Some("proxy.corral.local:8081".to_string()),
            profile: vec!["MICRO_PROFILE=platform".to_string()],
            ..ManagerConfig::default()
        });
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();
        f.processor.process(&key).await;

        let (_, create) = &f.runtime.created()[0];
        assert!(create.env.contains(&"MICRO_PROXY=proxy.corral.local:8081".to_string()));
        assert!(create.env.contains(&"MICRO_PROFILE=platform".to_string()));

        let f = fixture_with(ManagerConfig::default());
        let key = f
            .processor
            .record(EventType::Create, &foo(), &CreateOptions::in_namespace("ns1"))
            .unwrap();
        f.processor.process(&key).await;

        let (_, create) = &f.runtime.created()[0];
        assert!(create.env.contains(&"MICRO_PROFILE=".to_string()));
        assert!(!create.env.iter().any(|e| e.starts_with("MICRO_PROXY=")));
    }
}
