//! Ordered candidate/sequence filters run between opportunity identification
//! and sequence evaluation (§4.4.3): eligibility, recently-traded cooldown,
//! correlation-aware concentration, and per-pattern diversity.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::market::Venue;
use crate::domain::planning::{CandidateKind, OpportunityCandidate, Sequence};
use crate::domain::securities::Security;
use crate::domain::trading::OrderSide;

/// Whether buys are unrestricted by market hours for the venue this
/// currency maps to. Unmapped currencies default to strict (require the
/// venue open), the safer assumption.
fn currency_has_flexible_buy_hours(currency: &str) -> bool {
    Venue::from_currency(currency).map(|v| v.flexible_buy_hours()).unwrap_or(false)
}

/// Per-currency "is this venue currently open" lookup, supplied by the
/// caller (typically backed by `MarketHoursOracle`) so this module stays
/// free of a scheduler dependency.
pub struct EligibilityInput<'a> {
    pub securities: &'a HashMap<String, Security>,
    pub is_open: &'a dyn Fn(&str) -> bool,
    pub last_buy_at: &'a HashMap<String, DateTime<Utc>>,
    pub buy_cooldown_days: i64,
    pub min_hold_days: i64,
    pub now: DateTime<Utc>,
}

/// Eligibility + recently-traded cooldown (§4.4.3, first two filter stages).
/// Applied per-candidate since both gates are properties of a single
/// security, not of a whole sequence.
pub fn apply_eligibility_filters(
    candidates: &[OpportunityCandidate],
    input: &EligibilityInput,
) -> Vec<OpportunityCandidate> {
    candidates
        .iter()
        .filter(|c| is_eligible(c, input))
        .cloned()
        .collect()
}

fn is_eligible(candidate: &OpportunityCandidate, input: &EligibilityInput) -> bool {
    let Some(security) = input.securities.get(&candidate.security_id) else {
        return false;
    };
    if !security.active {
        return false;
    }

    let side = candidate.side();
    match side {
        OrderSide::Buy if !security.allow_buy => return false,
        OrderSide::Sell if !security.allow_sell => return false,
        _ => {}
    }

    match side {
        OrderSide::Sell => {
            if !(input.is_open)(&security.currency) {
                return false;
            }
        }
        OrderSide::Buy => {
            if !currency_has_flexible_buy_hours(&security.currency) && !(input.is_open)(&security.currency) {
                return false;
            }
        }
    }

    if let Some(last_buy) = input.last_buy_at.get(&candidate.security_id) {
        let since_last_buy = input.now.signed_duration_since(*last_buy);
        match side {
            OrderSide::Buy if since_last_buy < Duration::days(input.buy_cooldown_days) => return false,
            OrderSide::Sell if since_last_buy < Duration::days(input.min_hold_days) => return false,
            _ => {}
        }
    }

    true
}

/// Drops sequences that put weight behind two-or-more same-side securities
/// whose pairwise correlation exceeds `threshold` (§4.4.3 third filter
/// stage) -- piling into names that move together defeats the point of
/// having picked several of them.
pub fn filter_correlation_aware(
    sequences: Vec<Sequence>,
    correlation: &HashMap<(String, String), f64>,
    threshold: f64,
) -> Vec<Sequence> {
    sequences
        .into_iter()
        .filter(|seq| !concentrates_correlated_names(seq, correlation, threshold))
        .collect()
}

fn pair_correlation(correlation: &HashMap<(String, String), f64>, a: &str, b: &str) -> f64 {
    correlation
        .get(&(a.to_string(), b.to_string()))
        .or_else(|| correlation.get(&(b.to_string(), a.to_string())))
        .copied()
        .unwrap_or(0.0)
}

fn concentrates_correlated_names(
    sequence: &Sequence,
    correlation: &HashMap<(String, String), f64>,
    threshold: f64,
) -> bool {
    let buys: Vec<&str> = sequence
        .steps
        .iter()
        .filter(|s| s.side == OrderSide::Buy)
        .map(|s| s.security_id.as_str())
        .collect();

    for i in 0..buys.len() {
        for j in (i + 1)..buys.len() {
            if pair_correlation(correlation, buys[i], buys[j]) > threshold {
                return true;
            }
        }
    }
    false
}

/// Keeps at most `top_k` sequences per pattern, ranked by notional as a
/// cheap proxy for "how much of the plan this sequence actually moves" --
/// the real robust score is not available until after evaluation, which
/// this filter runs ahead of (§4.4.3 fourth filter stage).
pub fn filter_diversity_top_k(sequences: Vec<Sequence>, top_k: usize) -> Vec<Sequence> {
    let mut by_pattern: HashMap<_, Vec<Sequence>> = HashMap::new();
    for seq in sequences {
        by_pattern.entry(seq.pattern).or_default().push(seq);
    }

    let mut kept = Vec::new();
    for (_, mut group) in by_pattern {
        group.sort_by(|a, b| b.total_notional().cmp(&a.total_notional()));
        kept.extend(group.into_iter().take(top_k.max(1)));
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::planning::{ActionStep, SequencePattern};
    use rust_decimal_macros::dec;

    fn security(id: &str, currency: &str, allow_buy: bool, allow_sell: bool) -> Security {
        Security {
            security_id: id.into(),
            symbol: id.into(),
            isin: None,
            currency: currency.into(),
            country: None,
            industry: None,
            min_lot: dec!(1),
            allow_buy,
            allow_sell,
            active: true,
        }
    }

    fn candidate(id: &str, kind: CandidateKind) -> OpportunityCandidate {
        OpportunityCandidate {
            security_id: id.into(),
            kind,
            min_quantity: dec!(1),
            max_quantity: dec!(10),
            reason_tags: vec![],
            source_weight_gap: dec!(0.05),
        }
    }

    #[test]
    fn disallowed_side_is_filtered_out() {
        let mut securities = HashMap::new();
        securities.insert("AAPL".to_string(), security("AAPL", "USD", false, true));
        let last_buy = HashMap::new();
        let is_open = |_: &str| true;
        let input = EligibilityInput {
            securities: &securities,
            is_open: &is_open,
            last_buy_at: &last_buy,
            buy_cooldown_days: 30,
            min_hold_days: 90,
            now: Utc::now(),
        };
        let out = apply_eligibility_filters(&[candidate("AAPL", CandidateKind::WeightBuy)], &input);
        assert!(out.is_empty());
    }

    #[test]
    fn sell_blocked_when_venue_closed() {
        let mut securities = HashMap::new();
        securities.insert("HKEX1".to_string(), security("HKEX1", "HKD", true, true));
        let last_buy = HashMap::new();
        let is_open = |_: &str| false;
        let input = EligibilityInput {
            securities: &securities,
            is_open: &is_open,
            last_buy_at: &last_buy,
            buy_cooldown_days: 30,
            min_hold_days: 90,
            now: Utc::now(),
        };
        let out = apply_eligibility_filters(&[candidate("HKEX1", CandidateKind::ProfitTake)], &input);
        assert!(out.is_empty());
    }

    #[test]
    fn buy_within_cooldown_is_blocked() {
        let mut securities = HashMap::new();
        securities.insert("AAPL".to_string(), security("AAPL", "USD", true, true));
        let mut last_buy = HashMap::new();
        let now = Utc::now();
        last_buy.insert("AAPL".to_string(), now - Duration::days(5));
        let is_open = |_: &str| true;
        let input = EligibilityInput {
            securities: &securities,
            is_open: &is_open,
            last_buy_at: &last_buy,
            buy_cooldown_days: 30,
            min_hold_days: 90,
            now,
        };
        let out = apply_eligibility_filters(&[candidate("AAPL", CandidateKind::WeightBuy)], &input);
        assert!(out.is_empty());
    }

    #[test]
    fn sell_before_min_hold_is_blocked() {
        let mut securities = HashMap::new();
        securities.insert("AAPL".to_string(), security("AAPL", "USD", true, true));
        let mut last_buy = HashMap::new();
        let now = Utc::now();
        last_buy.insert("AAPL".to_string(), now - Duration::days(10));
        let is_open = |_: &str| true;
        let input = EligibilityInput {
            securities: &securities,
            is_open: &is_open,
            last_buy_at: &last_buy,
            buy_cooldown_days: 30,
            min_hold_days: 90,
            now,
        };
        let out = apply_eligibility_filters(&[candidate("AAPL", CandidateKind::ProfitTake)], &input);
        assert!(out.is_empty());
    }

    fn step(id: &str, side: OrderSide) -> ActionStep {
        ActionStep {
            security_id: id.into(),
            side,
            quantity: dec!(10),
            expected_price: dec!(100),
            currency: "USD".into(),
            reason_tags: vec![],
            score_delta: Decimal::ZERO,
        }
    }

    #[test]
    fn correlated_pair_is_dropped() {
        let seq = Sequence {
            pattern: SequencePattern::MixedStrategy,
            steps: vec![step("AAPL", OrderSide::Buy), step("MSFT", OrderSide::Buy)],
        };
        let mut corr = HashMap::new();
        corr.insert(("AAPL".to_string(), "MSFT".to_string()), 0.95);
        let out = filter_correlation_aware(vec![seq], &corr, 0.8);
        assert!(out.is_empty());
    }

    #[test]
    fn uncorrelated_pair_survives() {
        let seq = Sequence {
            pattern: SequencePattern::MixedStrategy,
            steps: vec![step("AAPL", OrderSide::Buy), step("MSFT", OrderSide::Buy)],
        };
        let corr = HashMap::new();
        let out = filter_correlation_aware(vec![seq], &corr, 0.8);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn diversity_filter_caps_per_pattern() {
        let a = Sequence {
            pattern: SequencePattern::DirectBuy,
            steps: vec![step("AAPL", OrderSide::Buy)],
        };
        let b = Sequence {
            pattern: SequencePattern::DirectBuy,
            steps: vec![step("MSFT", OrderSide::Buy)],
        };
        let out = filter_diversity_top_k(vec![a, b], 1);
        assert_eq!(out.len(), 1);
    }
}
