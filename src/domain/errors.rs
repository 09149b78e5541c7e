//! Error taxonomy shared by the queue, the planning pipeline, and the HTTP API.
//!
//! A single flat enum (rather than one enum per subsystem) because the
//! specification defines one taxonomy, not a family of per-area errors:
//! validation, lookup, and concurrency failures on one side, upstream and
//! transport failures on the other, plus the two policy-flavoured kinds
//! (`PolicyViolation`, `IntegrityError`) that need special handling by both
//! the worker pool and the HTTP error mapper.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("upstream rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("upstream timed out after {duration_ms}ms")]
    UpstreamTimeout { duration_ms: u64 },

    #[error("data integrity error on store '{store}': {reason}")]
    Integrity { store: String, reason: String },

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,
}

impl SentinelError {
    /// Whether the worker pool should retry a job that failed with this error.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            SentinelError::TransientNetwork(_) | SentinelError::UpstreamTimeout { .. }
        )
    }

    /// HTTP status the API error mapper (§7, §6.2) translates this kind into.
    pub fn http_status(&self) -> u16 {
        match self {
            SentinelError::Validation(_) => 400,
            SentinelError::NotFound(_) => 404,
            SentinelError::Conflict(_) => 409,
            SentinelError::PolicyViolation(_) => 409,
            SentinelError::Integrity { .. } => 500,
            SentinelError::TransientNetwork(_) => 502,
            SentinelError::UpstreamRejected(_) => 502,
            SentinelError::UpstreamTimeout { .. } => 504,
            SentinelError::Timeout { .. } => 504,
            SentinelError::Cancelled => 499,
        }
    }

    /// Short machine-readable kind tag used in the `{error:{kind,...}}` envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            SentinelError::Validation(_) => "ValidationError",
            SentinelError::NotFound(_) => "NotFoundError",
            SentinelError::Conflict(_) => "ConflictError",
            SentinelError::TransientNetwork(_) => "TransientNetworkError",
            SentinelError::UpstreamRejected(_) => "UpstreamRejected",
            SentinelError::UpstreamTimeout { .. } => "UpstreamTimeout",
            SentinelError::Integrity { .. } => "IntegrityError",
            SentinelError::PolicyViolation(_) => "PolicyViolation",
            SentinelError::Timeout { .. } => "Timeout",
            SentinelError::Cancelled => "Cancelled",
        }
    }
}

/// Guard-check failure raised inside `CHECK_GUARDS` (§4.5). Kept distinct from
/// `SentinelError` because guard failures are expected control flow for the
/// trading loop, not exceptional errors -- they drive a state transition
/// rather than a job outcome.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GuardViolation {
    #[error("daily loss cap breached: {loss_pct:.2}% > {cap_pct:.2}%")]
    DailyLossCap { loss_pct: f64, cap_pct: f64 },

    #[error("drawdown cap breached: {drawdown_pct:.2}% > {cap_pct:.2}%")]
    DrawdownCap { drawdown_pct: f64, cap_pct: f64 },

    #[error("per-symbol loss cap breached for {symbol}: {loss_pct:.2}% > {cap_pct:.2}%")]
    PerSymbolLossCap {
        symbol: String,
        loss_pct: f64,
        cap_pct: f64,
    },

    #[error("trade frequency limit: last trade {elapsed_secs}s ago < min interval {min_secs}s")]
    TradeFrequency { elapsed_secs: i64, min_secs: i64 },

    #[error("min-hold violated for {symbol}: held {held_days} days < {min_days} days")]
    MinHold {
        symbol: String,
        held_days: i64,
        min_days: i64,
    },

    #[error("buy cooldown active for {symbol}: {remaining_days} days remaining")]
    BuyCooldown {
        symbol: String,
        remaining_days: i64,
    },

    #[error("research mode: live execution disabled")]
    ResearchMode,

    #[error("market closed for venue {venue}")]
    MarketClosed { venue: String },

    #[error("insufficient cash: need {need} {currency}, available {available} {currency}")]
    InsufficientCash {
        need: Decimal,
        available: Decimal,
        currency: String,
    },

    #[error("circuit breaker open: {reason}")]
    CircuitOpen { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(SentinelError::TransientNetwork("x".into()).retryable());
        assert!(SentinelError::UpstreamTimeout { duration_ms: 10 }.retryable());
        assert!(!SentinelError::Validation("x".into()).retryable());
        assert!(!SentinelError::UpstreamRejected("no".into()).retryable());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(SentinelError::Validation("x".into()).http_status(), 400);
        assert_eq!(SentinelError::NotFound("x".into()).http_status(), 404);
        assert_eq!(SentinelError::PolicyViolation("x".into()).http_status(), 409);
        assert_eq!(
            SentinelError::Integrity {
                store: "ledger".into(),
                reason: "corrupt".into()
            }
            .http_status(),
            500
        );
    }
}
