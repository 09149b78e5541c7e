use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trading::OrderSide;

/// Named sequence shapes a sequence may match (§4.4.3). Used for diversity
/// filtering (top-K per pattern family) and for the narrative attached to
/// the final plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencePattern {
    DirectBuy,
    ProfitTaking,
    Rebalance,
    AveragingDown,
    SingleBest,
    MultiSell,
    MixedStrategy,
    OpportunityFirst,
    DeepRebalance,
    CashGeneration,
    CostOptimized,
    Adaptive,
    MarketRegime,
}

/// One step of a candidate sequence, valued at the price expected at its
/// execution point in the simulation (§4.4.3, §4.4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionStep {
    pub security_id: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub expected_price: Decimal,
    pub currency: String,
    pub reason_tags: Vec<String>,
    pub score_delta: Decimal,
}

impl ActionStep {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.expected_price
    }
}

/// An ordered, feasible-at-generation-time candidate sequence of 1-5 steps
/// (§4.4.3). `canonical_key` is the structural dedup key: same steps in the
/// same order, independent of which candidate generator produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub pattern: SequencePattern,
    pub steps: Vec<ActionStep>,
}

impl Sequence {
    pub fn canonical_key(&self) -> String {
        self.steps
            .iter()
            .map(|step| {
                format!(
                    "{}:{}:{}",
                    step.security_id,
                    step.side,
                    step.quantity.round_dp(6)
                )
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_notional(&self) -> Decimal {
        self.steps.iter().map(ActionStep::notional).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn step(security_id: &str, side: OrderSide, qty: Decimal) -> ActionStep {
        ActionStep {
            security_id: security_id.to_string(),
            side,
            quantity: qty,
            expected_price: dec!(100),
            currency: "USD".into(),
            reason_tags: vec![],
            score_delta: Decimal::ZERO,
        }
    }

    #[test]
    fn canonical_key_ignores_pattern_and_price() {
        let a = Sequence {
            pattern: SequencePattern::DirectBuy,
            steps: vec![step("AAPL", OrderSide::Buy, dec!(10))],
        };
        let b = Sequence {
            pattern: SequencePattern::SingleBest,
            steps: vec![ActionStep {
                expected_price: dec!(150),
                ..step("AAPL", OrderSide::Buy, dec!(10))
            }],
        };
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn total_notional_sums_steps() {
        let seq = Sequence {
            pattern: SequencePattern::Rebalance,
            steps: vec![
                step("AAPL", OrderSide::Buy, dec!(10)),
                step("MSFT", OrderSide::Sell, dec!(5)),
            ],
        };
        assert_eq!(seq.total_notional(), dec!(1500));
    }
}
