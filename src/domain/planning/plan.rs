use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::planning::sequence::{ActionStep, SequencePattern};

/// One step of a stored plan; a thin projection of `ActionStep` plus the
/// bookkeeping the plan builder itself owns (§4.4.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub step: ActionStep,
    pub step_index: u8,
}

/// The single recommendation row written by the plan builder, keyed by
/// `portfolio_hash` (§3, §4.4.5). Superseded by any later plan written for
/// the same hash; a plan for a different hash may coexist briefly while the
/// trading loop transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub portfolio_hash: String,
    pub pattern: SequencePattern,
    pub steps: Vec<PlanStep>,
    pub robust_score: f64,
    pub aggregate_transaction_cost: Decimal,
    pub narrative: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Plan {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn current_step(&self) -> Option<&PlanStep> {
        self.steps.first()
    }

    pub fn remaining_after(&self, step_index: u8) -> Vec<PlanStep> {
        self.steps
            .iter()
            .filter(|s| s.step_index > step_index)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::OrderSide;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_plan() -> Plan {
        let now = Utc::now();
        Plan {
            portfolio_hash: "abc123".into(),
            pattern: SequencePattern::SingleBest,
            steps: vec![PlanStep {
                step: ActionStep {
                    security_id: "AAPL".into(),
                    side: OrderSide::Buy,
                    quantity: dec!(10),
                    expected_price: dec!(150),
                    currency: "USD".into(),
                    reason_tags: vec![],
                    score_delta: Decimal::ZERO,
                },
                step_index: 0,
            }],
            robust_score: 0.82,
            aggregate_transaction_cost: dec!(1.5),
            narrative: "closes AAPL underweight gap".into(),
            created_at: now,
            expires_at: now + Duration::hours(24),
        }
    }

    #[test]
    fn not_expired_within_ttl() {
        let plan = sample_plan();
        assert!(!plan.is_expired(plan.created_at + Duration::hours(1)));
        assert!(plan.is_expired(plan.created_at + Duration::hours(25)));
    }

    #[test]
    fn current_step_is_first() {
        let plan = sample_plan();
        assert_eq!(plan.current_step().unwrap().step.security_id, "AAPL");
    }
}
