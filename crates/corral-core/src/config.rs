//! corral.toml manager configuration.
//!
//! Every field is optional; unset fields fall back to the defaults below.
//! Durations are written as strings (`"500ms"`, `"30s"`, `"5m"`, `"1h"`,
//! or a bare number of seconds).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_EVENT_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_EVENT_POLL_FREQUENCY: Duration = Duration::from_secs(60);
const DEFAULT_STATUS_POLL_FREQUENCY: Duration = Duration::from_secs(30);
const DEFAULT_CLAIM_TTL: Duration = Duration::from_secs(2 * 60);
const DEFAULT_MAX_CONCURRENT_DISPATCH: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration {0:?}")]
pub struct DurationError(pub String);

/// Parse a duration string like `"500ms"`, `"30s"`, `"5m"`, `"1h"` or `"45"`.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    let invalid = || DurationError(s.to_string());

    let (digits, scale_ms) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value
        .checked_mul(scale_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    /// How long an event stays in the store before expiring.
    pub event_ttl: Option<String>,
    /// Period of the sweep that redelivers unprocessed events.
    pub event_poll_frequency: Option<String>,
    /// Period of the runtime status poll.
    pub status_poll_frequency: Option<String>,
    /// Lease held in the shared store while one worker applies an event.
    pub claim_ttl: Option<String>,
    /// Rerun reconciliation on this period. Unset means once at start.
    pub reconcile_frequency: Option<String>,
    /// Upper bound on events applied concurrently.
    pub max_concurrent_dispatch: Option<usize>,
    /// Proxy address handed to services as `MICRO_PROXY`.
    pub proxy: Option<String>,
    /// Extra `K=V` environment entries given to every created service.
    #[serde(default)]
    pub profile: Vec<String>,
}

impl ManagerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ManagerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every duration field parses to a non-zero value and the
    /// dispatch bound is positive.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, raw) in [
            ("event_ttl", &self.event_ttl),
            ("event_poll_frequency", &self.event_poll_frequency),
            ("status_poll_frequency", &self.status_poll_frequency),
            ("claim_ttl", &self.claim_ttl),
            ("reconcile_frequency", &self.reconcile_frequency),
        ] {
            let Some(raw) = raw else { continue };
            if parse_duration(raw)?.is_zero() {
                anyhow::bail!("{field} must be greater than zero");
            }
        }
        if self.max_concurrent_dispatch == Some(0) {
            anyhow::bail!("max_concurrent_dispatch must be at least 1");
        }
        Ok(())
    }

    pub fn event_ttl(&self) -> Duration {
        duration_or(&self.event_ttl, DEFAULT_EVENT_TTL)
    }

    pub fn event_poll_frequency(&self) -> Duration {
        duration_or(&self.event_poll_frequency, DEFAULT_EVENT_POLL_FREQUENCY)
    }

    pub fn status_poll_frequency(&self) -> Duration {
        duration_or(&self.status_poll_frequency, DEFAULT_STATUS_POLL_FREQUENCY)
    }

    pub fn claim_ttl(&self) -> Duration {
        duration_or(&self.claim_ttl, DEFAULT_CLAIM_TTL)
    }

    pub fn reconcile_frequency(&self) -> Option<Duration> {
        self.reconcile_frequency
            .as_deref()
            .and_then(|s| parse_duration(s).ok())
            .filter(|d| !d.is_zero())
    }

    pub fn max_concurrent_dispatch(&self) -> usize {
        self.max_concurrent_dispatch
            .unwrap_or(DEFAULT_MAX_CONCURRENT_DISPATCH)
            .max(1)
    }
}

fn duration_or(raw: &Option<String>, default: Duration) -> Duration {
    raw.as_deref()
        .and_then(|s| parse_duration(s).ok())
        .filter(|d| !d.is_zero())
        .unwrap_or(default)
}
