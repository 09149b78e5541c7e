use crate::domain::scheduling::cadence::{Cadence, MarketGate};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Critical,
    Normal,
    Background,
}

/// Error kinds a job declares as retryable (§4.1). Matched against
/// `SentinelError::kind()`.
pub type RetryableKinds = HashSet<&'static str>;

/// A scheduled job as a data value rather than a closure with implicit
/// config (§9 design note). The registry (`application::queue::registry`)
/// is a table of these rows; adding a job means adding a row, not touching
/// control flow.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: &'static str,
    pub cadence: Option<Cadence>,
    pub market_gate: MarketGate,
    pub priority: Priority,
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub retryable_errors: RetryableKinds,
}

impl JobSpec {
    pub fn scheduled(
        name: &'static str,
        cadence: Cadence,
        market_gate: MarketGate,
        priority: Priority,
    ) -> Self {
        Self {
            name,
            cadence: Some(cadence),
            market_gate,
            priority,
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(60),
            retryable_errors: ["TransientNetworkError", "UpstreamTimeout"].into_iter().collect(),
        }
    }

    /// A job only ever enqueued on demand (e.g. a manual backfill), never
    /// by the time scheduler directly.
    pub fn on_demand(name: &'static str, priority: Priority) -> Self {
        Self {
            name,
            cadence: None,
            market_gate: MarketGate::Always,
            priority,
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(120),
            retryable_errors: ["TransientNetworkError", "UpstreamTimeout"].into_iter().collect(),
        }
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    pub fn retries(&self, error_kind: &str) -> bool {
        self.retryable_errors.contains(error_kind)
    }
}
