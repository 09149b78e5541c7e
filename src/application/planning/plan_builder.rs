//! Picks the winning sequence and writes it as the one recommendation row
//! for its `portfolio_hash` (§4.4.5).

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::application::planning::sequence_evaluator::EvaluatedSequence;
use crate::domain::planning::{Plan, PlanStep};

pub const RECOMMENDATION_TTL: Duration = Duration::hours(24);

/// No feasible sequence cleared the transaction-cost ceiling, or there was
/// nothing to evaluate in the first place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoFeasiblePlan;

/// Picks the highest robust-score sequence whose aggregate transaction cost
/// stays under `max_cost_fraction` of `portfolio_equity`, and renders it
/// into a storable `Plan` with a narrative (§4.4.5). Does not write
/// anything -- the caller owns persistence and event emission so this stays
/// unit-testable without a database.
pub fn build_plan(
    portfolio_hash: &str,
    evaluated: &[EvaluatedSequence],
    portfolio_equity: Decimal,
    max_cost_fraction: Decimal,
    now: DateTime<Utc>,
) -> Result<Plan, NoFeasiblePlan> {
    let cost_ceiling = if portfolio_equity > Decimal::ZERO {
        portfolio_equity * max_cost_fraction
    } else {
        Decimal::ZERO
    };

    let winner = evaluated
        .iter()
        .filter(|e| portfolio_equity <= Decimal::ZERO || e.aggregate_transaction_cost < cost_ceiling)
        .max_by(|a, b| a.robust_score.total_cmp(&b.robust_score))
        .ok_or(NoFeasiblePlan)?;

    let steps: Vec<PlanStep> = winner
        .sequence
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| PlanStep {
            step: step.clone(),
            step_index: i as u8,
        })
        .collect();

    Ok(Plan {
        portfolio_hash: portfolio_hash.to_string(),
        pattern: winner.sequence.pattern,
        steps,
        robust_score: winner.robust_score,
        aggregate_transaction_cost: winner.aggregate_transaction_cost,
        narrative: narrative(winner),
        created_at: now,
        expires_at: now + RECOMMENDATION_TTL,
    })
}

/// Human-readable narrative describing which gaps close, which scores
/// improve, and which risks remain (§4.4.5) -- generated from the winning
/// sequence's own breakdown rather than a fixed template, so it stays
/// truthful if the weighting changes.
fn narrative(evaluated: &EvaluatedSequence) -> String {
    let breakdown = &evaluated.breakdown;
    let mut closes = Vec::new();
    for step in &evaluated.sequence.steps {
        closes.push(format!("{} {} {}", step.side, step.quantity, step.security_id));
    }
    let actions = if closes.is_empty() {
        "no trades".to_string()
    } else {
        closes.join(", ")
    };

    let mut risks = Vec::new();
    if breakdown.risk_cvar < 0.5 {
        risks.push("elevated CVaR");
    }
    if breakdown.risk_volatility < 0.5 {
        risks.push("elevated volatility");
    }
    if breakdown.risk_drawdown < 0.5 {
        risks.push("elevated drawdown tail");
    }
    let risk_note = if risks.is_empty() {
        "risk profile within normal range".to_string()
    } else {
        format!("residual risk: {}", risks.join(", "))
    };

    format!(
        "{:?} sequence ({}): alignment {:.0}%, diversification {:.0}%/{:.0}%, {}. \
         Robust score {:.3}, aggregate transaction cost {}.",
        evaluated.sequence.pattern,
        actions,
        breakdown.expected_return_alignment * 100.0,
        breakdown.diversification_country * 100.0,
        breakdown.diversification_industry * 100.0,
        risk_note,
        evaluated.robust_score,
        evaluated.aggregate_transaction_cost,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::planning::{ActionStep, ScoreBreakdown, Sequence, SequencePattern};
    use crate::domain::trading::OrderSide;
    use rust_decimal_macros::dec;

    fn evaluated(robust_score: f64, cost: Decimal) -> EvaluatedSequence {
        EvaluatedSequence {
            sequence: Sequence {
                pattern: SequencePattern::DirectBuy,
                steps: vec![ActionStep {
                    security_id: "AAPL".into(),
                    side: OrderSide::Buy,
                    quantity: dec!(10),
                    expected_price: dec!(150),
                    currency: "USD".into(),
                    reason_tags: vec![],
                    score_delta: dec!(0.05),
                }],
            },
            breakdown: ScoreBreakdown::default(),
            base_score: robust_score,
            robust_score,
            aggregate_transaction_cost: cost,
        }
    }

    #[test]
    fn picks_highest_robust_score_under_cost_ceiling() {
        let now = Utc::now();
        let candidates = vec![evaluated(0.5, dec!(1)), evaluated(0.9, dec!(2))];
        let plan = build_plan("hash1", &candidates, dec!(100000), dec!(0.05), now).unwrap();
        assert_eq!(plan.robust_score, 0.9);
        assert_eq!(plan.portfolio_hash, "hash1");
        assert_eq!(plan.expires_at, now + RECOMMENDATION_TTL);
    }

    #[test]
    fn rejects_sequence_over_cost_ceiling() {
        let now = Utc::now();
        let candidates = vec![evaluated(0.9, dec!(10000))];
        let plan = build_plan("hash1", &candidates, dec!(100000), dec!(0.01), now);
        assert_eq!(plan.unwrap_err(), NoFeasiblePlan);
    }

    #[test]
    fn empty_candidates_yield_no_feasible_plan() {
        let now = Utc::now();
        let plan = build_plan("hash1", &[], dec!(100000), dec!(0.05), now);
        assert_eq!(plan.unwrap_err(), NoFeasiblePlan);
    }
}
