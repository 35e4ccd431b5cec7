//! corral-manager: the runtime manager of the Corral control plane.
//!
//! Reconciles a durably declared desired state of services against the
//! live state of an execution runtime. Commands are recorded as events in
//! the shared store and applied asynchronously, so callers never wait on
//! slow workload operations and lost commands are redelivered.
//!
//! # Architecture
//!
//! ```text
//! Manager (create / read / update / delete / start / stop / logs)
//!   ├── ServiceRegistry   service/{ns}/{name}:{version}   shared store
//!   ├── EventProcessor    event/{uuid}, claim/{event}     shared store
//!   │                     processed/{event}               cache store
//!   ├── DispatchQueue ──> dispatcher (bounded workers) ──> EventProcessor
//!   ├── EventSweeper      ticker, re-queues unprocessed events
//!   ├── StatusPoller      ticker, Runtime::read ──> StatusCache (cache store)
//!   └── Resurrector       at start (optionally on a ticker), recreates lost services
//! ```

pub mod dispatch;
pub mod error;
pub mod events;
pub mod manager;
pub mod registry;
pub mod resurrect;
pub mod runtime;
pub mod status;

#[cfg(test)]
mod mock;

pub use dispatch::{DispatchQueue, EventSweeper};
pub use error::{ManagerError, ManagerResult};
pub use events::{EventProcessor, ProcessOutcome, runtime_env};
pub use manager::Manager;
pub use registry::{RecordState, ServiceRecord, ServiceRegistry};
pub use resurrect::{ResurrectionReport, Resurrector};
pub use runtime::{
    Auth, DeleteOptions, GenerateOptions, LogRecord, LogStream, LogsOptions, ReadOptions, Runtime,
    RuntimeCreateOptions, RuntimeError, UpdateOptions,
};
pub use status::{StatusCache, StatusPoller};
