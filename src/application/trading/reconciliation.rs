//! Daily reconciliation and the circuit-breaker/windfall-cooldown safety net
//! (§4.6). Pure computation here; the caller (a `daily_reconciliation` job
//! handler in `application::jobs`) owns fetching broker/ledger balances,
//! persisting corrections, and emitting `reconcile_alert` events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::risk::{CircuitBreakerState, WindfallCooldown};

/// Cash invariant tolerance (§4.6): any drift at or under this is rounding
/// noise, not a reconciliation event.
pub const CASH_INVARIANT_EPSILON: Decimal = dec!(0.01);

/// Above the epsilon but at or under this is "small drift" -- corrected in
/// place by writing an adjusting cash flow. Anything larger is "large
/// drift" -- left alone and surfaced as `reconcile_alert` for a human to
/// look at, since silently rewriting a large gap could paper over a real
/// broker-side problem.
pub const SMALL_DRIFT_CEILING: Decimal = dec!(5.00);

#[derive(Debug, Clone, PartialEq)]
pub struct CashDrift {
    pub currency: String,
    pub broker_cash: Decimal,
    pub ledger_cash: Decimal,
    pub drift: Decimal,
    pub auto_corrected: bool,
}

pub struct DailyReconciliationInput<'a> {
    pub broker_cash: &'a HashMap<String, Decimal>,
    pub ledger_cash: &'a HashMap<String, Decimal>,
    pub monthly_return_pct: Decimal,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub drifts: Vec<CashDrift>,
    pub windfall_cooldown: Option<WindfallCooldown>,
}

impl ReconciliationReport {
    pub fn needs_alert(&self) -> bool {
        self.drifts.iter().any(|d| !d.auto_corrected)
    }
}

/// Compares broker-reported cash against the ledger's view per currency and
/// stages a windfall cooldown if the month's return crossed the trigger
/// (§4.6). Runs once daily at 04:00 local, scheduled by the time scheduler's
/// cadence table.
pub fn daily_reconciliation(input: &DailyReconciliationInput) -> ReconciliationReport {
    let mut currencies: Vec<&String> = input.broker_cash.keys().chain(input.ledger_cash.keys()).collect();
    currencies.sort();
    currencies.dedup();

    let mut drifts = Vec::new();
    for currency in currencies {
        let broker = input.broker_cash.get(currency).copied().unwrap_or(Decimal::ZERO);
        let ledger = input.ledger_cash.get(currency).copied().unwrap_or(Decimal::ZERO);
        let drift = (broker - ledger).abs();
        if drift <= CASH_INVARIANT_EPSILON {
            continue;
        }
        drifts.push(CashDrift {
            currency: currency.clone(),
            broker_cash: broker,
            ledger_cash: ledger,
            drift,
            auto_corrected: drift <= SMALL_DRIFT_CEILING,
        });
    }

    let windfall_cooldown = if input.monthly_return_pct > WindfallCooldown::TRIGGER_MONTHLY_GAIN_PCT {
        Some(WindfallCooldown::new(input.now))
    } else {
        None
    };

    ReconciliationReport { drifts, windfall_cooldown }
}

/// Admin-only recovery path (§4.6): pause is lifted only by explicit operator
/// action, never automatically. Wired to a dedicated HTTP endpoint, never
/// called from inside the trading loop itself.
pub fn clear_circuit_breaker(circuit: &mut CircuitBreakerState) {
    circuit.clear();
}

/// Records the outcome of the `ledger` health-check job (§4.1, §4.6): a
/// failure is one of the three circuit-breaker triggers and always reads as
/// `FullHalt` regardless of the other two.
pub fn record_ledger_health_check(circuit: &mut CircuitBreakerState, healthy: bool) {
    circuit.ledger_health_check_failed = !healthy;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_drift_is_auto_corrected() {
        let mut broker = HashMap::new();
        broker.insert("USD".to_string(), dec!(10002.00));
        let mut ledger = HashMap::new();
        ledger.insert("USD".to_string(), dec!(10000.00));
        let input = DailyReconciliationInput {
            broker_cash: &broker,
            ledger_cash: &ledger,
            monthly_return_pct: dec!(0),
            now: Utc::now(),
        };
        let report = daily_reconciliation(&input);
        assert_eq!(report.drifts.len(), 1);
        assert!(report.drifts[0].auto_corrected);
        assert!(!report.needs_alert());
    }

    #[test]
    fn large_drift_needs_alert() {
        let mut broker = HashMap::new();
        broker.insert("USD".to_string(), dec!(10500.00));
        let mut ledger = HashMap::new();
        ledger.insert("USD".to_string(), dec!(10000.00));
        let input = DailyReconciliationInput {
            broker_cash: &broker,
            ledger_cash: &ledger,
            monthly_return_pct: dec!(0),
            now: Utc::now(),
        };
        let report = daily_reconciliation(&input);
        assert!(report.needs_alert());
        assert!(!report.drifts[0].auto_corrected);
    }

    #[test]
    fn drift_within_epsilon_is_ignored() {
        let mut broker = HashMap::new();
        broker.insert("USD".to_string(), dec!(10000.005));
        let mut ledger = HashMap::new();
        ledger.insert("USD".to_string(), dec!(10000.00));
        let input = DailyReconciliationInput {
            broker_cash: &broker,
            ledger_cash: &ledger,
            monthly_return_pct: dec!(0),
            now: Utc::now(),
        };
        let report = daily_reconciliation(&input);
        assert!(report.drifts.is_empty());
    }

    #[test]
    fn windfall_gain_triggers_cooldown() {
        let broker = HashMap::new();
        let ledger = HashMap::new();
        let now = Utc::now();
        let input = DailyReconciliationInput {
            broker_cash: &broker,
            ledger_cash: &ledger,
            monthly_return_pct: dec!(25.0),
            now,
        };
        let report = daily_reconciliation(&input);
        assert!(report.windfall_cooldown.is_some());
        assert!(report.windfall_cooldown.unwrap().is_active(now));
    }

    #[test]
    fn modest_gain_does_not_trigger_cooldown() {
        let broker = HashMap::new();
        let ledger = HashMap::new();
        let input = DailyReconciliationInput {
            broker_cash: &broker,
            ledger_cash: &ledger,
            monthly_return_pct: dec!(5.0),
            now: Utc::now(),
        };
        let report = daily_reconciliation(&input);
        assert!(report.windfall_cooldown.is_none());
    }

    #[test]
    fn clear_resets_all_triggers() {
        let mut circuit = CircuitBreakerState::new(5, dec!(1000));
        circuit.consecutive_losing_trades = 5;
        circuit.ledger_health_check_failed = true;
        clear_circuit_breaker(&mut circuit);
        assert_eq!(circuit.consecutive_losing_trades, 0);
        assert!(!circuit.ledger_health_check_failed);
    }
}
