//! corralctl: operator tool for a Corral runtime manager store.
//!
//! Reads the durable store the manager writes (registry records and the
//! event log) without going through a running manager.
//!
//! # Usage
//!
//! ```text
//! corralctl --data-dir /var/lib/corral services --namespace ns1
//! corralctl --data-dir /var/lib/corral events
//! corralctl --data-dir /var/lib/corral purge
//! corralctl check-config corral.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use corral_core::{Event, ManagerConfig};
use corral_manager::ServiceRegistry;
use corral_manager::events::EVENT_PREFIX;
use corral_manager::registry::ServiceRecord;
use corral_store::{RedbStore, STORE_FILE, Store};

#[derive(Parser)]
#[command(name = "corralctl", about = "Inspect and maintain a Corral manager store")]
struct Cli {
    /// Directory holding the manager's durable store.
    #[arg(long, global = true, default_value = "/var/lib/corral")]
    data_dir: PathBuf,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered services, tombstones included.
    Services {
        /// Only this namespace. All namespaces when omitted.
        #[arg(long)]
        namespace: Option<String>,
    },
    /// List events that have not expired yet.
    Events,
    /// Physically remove expired records.
    Purge,
    /// Load a manager config file and print the effective settings.
    CheckConfig {
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,corral=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let lines = run(&cli)?;
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<Vec<String>> {
    match &cli.command {
        Command::Services { namespace } => {
            let store = open_store(&cli.data_dir)?;
            let records = list_services(store, namespace.as_deref())?;
            records
                .iter()
                .map(|r| render(cli.json, r, describe_record))
                .collect()
        }
        Command::Events => {
            let store = open_store(&cli.data_dir)?;
            let events = list_events(&*store)?;
            events
                .iter()
                .map(|(key, event)| render(cli.json, event, |e| describe_event(key, e)))
                .collect()
        }
        Command::Purge => {
            let path = store_path(&cli.data_dir)?;
            let store = RedbStore::open(&path)?;
            let removed = store.purge_expired()?;
            info!(removed, path = ?path, "expired records purged");
            Ok(vec![format!("purged {removed} expired records")])
        }
        Command::CheckConfig { file } => {
            let config = ManagerConfig::from_file(file)
                .with_context(|| format!("invalid config {}", file.display()))?;
            Ok(describe_config(&config))
        }
    }
}

fn store_path(data_dir: &Path) -> anyhow::Result<PathBuf> {
    let path = data_dir.join(STORE_FILE);
    if !path.exists() {
        anyhow::bail!("no store at {}", path.display());
    }
    Ok(path)
}

fn open_store(data_dir: &Path) -> anyhow::Result<Arc<dyn Store>> {
    let path = store_path(data_dir)?;
    let store = RedbStore::open(&path)?;
    debug!(path = ?path, "store opened");
    Ok(Arc::new(store))
}

fn list_services(
    store: Arc<dyn Store>,
    namespace: Option<&str>,
) -> anyhow::Result<Vec<ServiceRecord>> {
    let registry = ServiceRegistry::new(store);
    let namespaces = match namespace {
        Some(ns) => vec![ns.to_string()],
        None => registry.list_namespaces()?,
    };

    let mut records = Vec::new();
    for ns in namespaces {
        records.extend(registry.list_records(&ns, None, None)?);
    }
    Ok(records)
}

fn list_events(store: &dyn Store) -> anyhow::Result<Vec<(String, Event)>> {
    let mut events = Vec::new();
    for rec in store.read_prefix(EVENT_PREFIX)? {
        match serde_json::from_slice::<Event>(&rec.value) {
            Ok(event) => events.push((rec.key, event)),
            Err(e) => warn!(key = %rec.key, error = %e, "skipping undecodable event"),
        }
    }
    Ok(events)
}

fn render<T: serde::Serialize>(
    json: bool,
    value: &T,
    text: impl Fn(&T) -> String,
) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string(value)?)
    } else {
        Ok(text(value))
    }
}

fn describe_record(record: &ServiceRecord) -> String {
    let state = if record.is_deleting() { "deleting" } else { "active" };
    let mut line = format!(
        "{}/{}  {}  updated_at={}",
        record.namespace(),
        record.service.identity(),
        state,
        record.updated_at
    );
    if !record.options.image.is_empty() {
        line.push_str(&format!("  image={}", record.options.image));
    }
    line
}

fn describe_event(key: &str, event: &Event) -> String {
    format!(
        "{key}  {}  {}/{}",
        event.event_type,
        event.namespace(),
        event.service.identity()
    )
}

fn describe_config(config: &ManagerConfig) -> Vec<String> {
    let reconcile = config
        .reconcile_frequency()
        .map(|d| format!("{d:?}"))
        .unwrap_or_else(|| "at start only".to_string());
    let mut lines = vec![
        format!("event_ttl = {:?}", config.event_ttl()),
        format!("event_poll_frequency = {:?}", config.event_poll_frequency()),
        format!("status_poll_frequency = {:?}", config.status_poll_frequency()),
        format!("claim_ttl = {:?}", config.claim_ttl()),
        format!("reconcile_frequency = {reconcile}"),
        format!("max_concurrent_dispatch = {}", config.max_concurrent_dispatch()),
        format!("proxy = {}", config.proxy.as_deref().unwrap_or("none")),
    ];
    for entry in &config.profile {
        lines.push(format!("profile {entry}"));
    }
    lines
}
