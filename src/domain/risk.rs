//! Circuit breaker halt levels and the windfall cooldown state (§4.6).
//!
//! Rather than a binary paused/running flag, the three independent triggers
//! (consecutive losing trades, daily loss cap, ledger health-check failure)
//! are staged into the same `HaltLevel` ladder so the reconciliation daemon
//! and the trading loop's `CHECK_GUARDS` step can reason about "how bad" in
//! one shared vocabulary instead of three separate booleans.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Staged severity of an open circuit breaker. Each trigger maps its own
/// metric onto this ladder at 50%/75%/100% of its configured limit; the
/// effective level for the account is the max across all three triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HaltLevel {
    /// Below 50% of every configured limit. Trading proceeds normally.
    Normal,
    /// At or above 50% of a limit. Trading proceeds; emits a warning event.
    Warning,
    /// At or above 75% of a limit. New buy orders are blocked; sells and
    /// closes still proceed so the account can de-risk.
    Reduced,
    /// At or above 100% of a limit. All new orders are blocked until a
    /// human clears the breaker or the triggering window rolls off.
    FullHalt,
}

impl HaltLevel {
    /// Maps a `value / limit` ratio onto the ladder using the 50/75/100
    /// staging named in §4.6. `limit` of zero is treated as already
    /// breached (avoids a divide-by-zero reading as "normal").
    pub fn from_ratio(value: Decimal, limit: Decimal) -> Self {
        if limit <= Decimal::ZERO {
            return HaltLevel::FullHalt;
        }
        let ratio = value / limit;
        if ratio >= Decimal::ONE {
            HaltLevel::FullHalt
        } else if ratio >= Decimal::new(75, 2) {
            HaltLevel::Reduced
        } else if ratio >= Decimal::new(50, 2) {
            HaltLevel::Warning
        } else {
            HaltLevel::Normal
        }
    }

    pub fn blocks_buys(self) -> bool {
        matches!(self, HaltLevel::Reduced | HaltLevel::FullHalt)
    }

    pub fn blocks_all_orders(self) -> bool {
        matches!(self, HaltLevel::FullHalt)
    }
}

/// Per-trigger readings that feed the effective `HaltLevel`. Tracked
/// separately so the reconciliation daemon can report which trigger is
/// driving the halt rather than just the aggregate level.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerState {
    pub consecutive_losing_trades: u32,
    pub consecutive_losing_trades_limit: u32,
    pub daily_loss: Decimal,
    pub daily_loss_limit: Decimal,
    pub ledger_health_check_failed: bool,
}

impl CircuitBreakerState {
    pub fn new(consecutive_losing_trades_limit: u32, daily_loss_limit: Decimal) -> Self {
        Self {
            consecutive_losing_trades: 0,
            consecutive_losing_trades_limit,
            daily_loss: Decimal::ZERO,
            daily_loss_limit,
            ledger_health_check_failed: false,
        }
    }

    /// Effective halt level: the worst of the three trigger readings. A
    /// failed ledger health-check is binary -- it always reads as
    /// `FullHalt` since a corrupt ledger isn't a matter of degree.
    pub fn effective_level(&self) -> HaltLevel {
        if self.ledger_health_check_failed {
            return HaltLevel::FullHalt;
        }
        let losing_trades_level = HaltLevel::from_ratio(
            Decimal::from(self.consecutive_losing_trades),
            Decimal::from(self.consecutive_losing_trades_limit),
        );
        let daily_loss_level = HaltLevel::from_ratio(self.daily_loss, self.daily_loss_limit);
        losing_trades_level.max(daily_loss_level)
    }

    pub fn record_trade_result(&mut self, pnl: Decimal) {
        if pnl < Decimal::ZERO {
            self.consecutive_losing_trades += 1;
            self.daily_loss += -pnl;
        } else {
            self.consecutive_losing_trades = 0;
        }
    }

    pub fn reset_daily(&mut self) {
        self.daily_loss = Decimal::ZERO;
    }

    pub fn clear(&mut self) {
        self.consecutive_losing_trades = 0;
        self.daily_loss = Decimal::ZERO;
        self.ledger_health_check_failed = false;
    }
}

/// Aggression reduction applied after an outsized monthly gain (§4.6): a
/// >20% monthly return trims position-sizing aggression by 25% for the
/// following 30 days, preventing Kelly sizing from chasing a hot streak.
#[derive(Debug, Clone)]
pub struct WindfallCooldown {
    pub triggered_at: DateTime<Utc>,
    pub aggression_multiplier: Decimal,
}

impl WindfallCooldown {
    pub const TRIGGER_MONTHLY_GAIN_PCT: Decimal = Decimal::from_parts(20, 0, 0, false, 2);
    pub const AGGRESSION_REDUCTION_PCT: Decimal = Decimal::from_parts(25, 0, 0, false, 2);
    pub const COOLDOWN_DAYS: i64 = 30;

    pub fn new(triggered_at: DateTime<Utc>) -> Self {
        Self {
            triggered_at,
            aggression_multiplier: Decimal::ONE - Self::AGGRESSION_REDUCTION_PCT,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.triggered_at + chrono::Duration::days(Self::COOLDOWN_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ratio_stages_into_ladder() {
        assert_eq!(HaltLevel::from_ratio(dec!(0), dec!(100)), HaltLevel::Normal);
        assert_eq!(HaltLevel::from_ratio(dec!(49), dec!(100)), HaltLevel::Normal);
        assert_eq!(HaltLevel::from_ratio(dec!(50), dec!(100)), HaltLevel::Warning);
        assert_eq!(HaltLevel::from_ratio(dec!(75), dec!(100)), HaltLevel::Reduced);
        assert_eq!(HaltLevel::from_ratio(dec!(100), dec!(100)), HaltLevel::FullHalt);
        assert_eq!(HaltLevel::from_ratio(dec!(150), dec!(100)), HaltLevel::FullHalt);
    }

    #[test]
    fn zero_limit_reads_as_full_halt() {
        assert_eq!(HaltLevel::from_ratio(dec!(0), dec!(0)), HaltLevel::FullHalt);
    }

    #[test]
    fn effective_level_is_worst_of_the_triggers() {
        let mut state = CircuitBreakerState::new(5, dec!(1000));
        assert_eq!(state.effective_level(), HaltLevel::Normal);

        state.record_trade_result(dec!(-10));
        state.record_trade_result(dec!(-10));
        state.record_trade_result(dec!(-10));
        assert_eq!(state.effective_level(), HaltLevel::Warning);

        state.record_trade_result(dec!(5));
        assert_eq!(state.consecutive_losing_trades, 0);
        assert_eq!(state.effective_level(), HaltLevel::Normal);
    }

    #[test]
    fn ledger_health_failure_always_full_halts() {
        let mut state = CircuitBreakerState::new(5, dec!(1000));
        state.ledger_health_check_failed = true;
        assert_eq!(state.effective_level(), HaltLevel::FullHalt);
    }

    #[test]
    fn windfall_cooldown_expires_after_thirty_days() {
        let start = Utc::now();
        let cooldown = WindfallCooldown::new(start);
        assert!(cooldown.is_active(start + chrono::Duration::days(10)));
        assert!(!cooldown.is_active(start + chrono::Duration::days(31)));
    }
}
