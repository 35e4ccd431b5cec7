//! corral-core: shared types for the Corral runtime manager.
//!
//! Holds the service model exchanged between the manager, the durable
//! store and the execution runtimes, plus the TOML manager configuration.

pub mod config;
pub mod types;

pub use config::{ManagerConfig, parse_duration};
pub use types::*;
