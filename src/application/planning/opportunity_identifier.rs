use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::planning::{CandidateKind, OpportunityCandidate};

/// Per-security signal inputs the opportunity identifier scores candidates
/// from (§4.4.2). `fundamentals_score` and `long_term_score` feed the
/// quality gate; `opportunity_score` is independent of both the weight gap
/// and P&L and feeds `OPPORTUNITY_BUY` alone (e.g. an analyst-rating or
/// momentum composite); `country`/`industry` are only used by downstream
/// diversification scoring, not here.
#[derive(Debug, Clone)]
pub struct SecuritySignal {
    pub security_id: String,
    pub target_weight: Decimal,
    pub current_weight: Decimal,
    pub fundamentals_score: f64,
    pub long_term_score: f64,
    pub opportunity_score: f64,
    pub unrealized_pnl_pct: Decimal,
    pub min_lot: Decimal,
    pub allow_buy: bool,
    pub allow_sell: bool,
}

pub struct OpportunityIdentifierInput {
    pub signals: Vec<SecuritySignal>,
    pub regime_score: f64,
}

const FUNDAMENTALS_GATE: f64 = 0.6;
const LONG_TERM_SCORE_GATE: f64 = 0.5;
const MIN_WEIGHT_GAP: Decimal = Decimal::from_parts(5, 0, 0, false, 3); // 0.005
const PROFIT_TAKE_THRESHOLD_PCT: Decimal = Decimal::from_parts(20, 0, 0, false, 2); // 0.20
const AVERAGE_DOWN_THRESHOLD_PCT: Decimal = Decimal::from_parts(15, 0, 0, false, 2); // -0.15 applied as abs
const OPPORTUNITY_SCORE_GATE: f64 = 0.75;

/// Turns `w*` vs current weights into candidate actions (§4.4.2). Securities
/// failing the quality gate are dropped entirely, even if they have a large
/// weight gap -- a stale high-conviction signal never overrides low current
/// fundamentals.
pub fn identify_opportunities(input: &OpportunityIdentifierInput) -> Vec<OpportunityCandidate> {
    let mut candidates = Vec::new();

    for signal in &input.signals {
        if signal.fundamentals_score < FUNDAMENTALS_GATE || signal.long_term_score < LONG_TERM_SCORE_GATE {
            continue;
        }

        let gap = signal.target_weight - signal.current_weight;

        if gap > MIN_WEIGHT_GAP && signal.allow_buy {
            candidates.push(weight_gap_candidate(signal, gap, CandidateKind::WeightBuy));
        } else if gap < -MIN_WEIGHT_GAP && signal.allow_sell {
            candidates.push(weight_gap_candidate(signal, gap, CandidateKind::WeightSell));
        }

        if signal.unrealized_pnl_pct >= PROFIT_TAKE_THRESHOLD_PCT && signal.allow_sell {
            candidates.push(profit_take_candidate(signal));
        }

        if signal.unrealized_pnl_pct <= -AVERAGE_DOWN_THRESHOLD_PCT
            && signal.allow_buy
            && signal.target_weight >= signal.current_weight
        {
            candidates.push(average_down_candidate(signal));
        }

        if gap.abs() <= MIN_WEIGHT_GAP && gap != Decimal::ZERO {
            let kind = if gap > Decimal::ZERO {
                CandidateKind::RebalanceBuy
            } else {
                CandidateKind::RebalanceSell
            };
            if (kind == CandidateKind::RebalanceBuy && signal.allow_buy)
                || (kind == CandidateKind::RebalanceSell && signal.allow_sell)
            {
                candidates.push(weight_gap_candidate(signal, gap, kind));
            }
        }

        // Driven purely by signal quality, independent of weight gap or P&L --
        // a security already at or above target can still surface here.
        if signal.opportunity_score >= OPPORTUNITY_SCORE_GATE && signal.allow_buy {
            candidates.push(opportunity_buy_candidate(signal));
        }
    }

    candidates
}

fn weight_gap_candidate(signal: &SecuritySignal, gap: Decimal, kind: CandidateKind) -> OpportunityCandidate {
    let magnitude = gap.abs();
    OpportunityCandidate {
        security_id: signal.security_id.clone(),
        kind,
        min_quantity: signal.min_lot.max(Decimal::ONE),
        max_quantity: (magnitude * Decimal::from(1000)).max(signal.min_lot),
        reason_tags: vec!["weight_gap".to_string()],
        source_weight_gap: gap,
    }
}

fn profit_take_candidate(signal: &SecuritySignal) -> OpportunityCandidate {
    OpportunityCandidate {
        security_id: signal.security_id.clone(),
        kind: CandidateKind::ProfitTake,
        min_quantity: signal.min_lot.max(Decimal::ONE),
        max_quantity: signal.min_lot.max(Decimal::ONE) * Decimal::from(10),
        reason_tags: vec!["profit_take".to_string()],
        source_weight_gap: Decimal::ZERO,
    }
}

fn opportunity_buy_candidate(signal: &SecuritySignal) -> OpportunityCandidate {
    OpportunityCandidate {
        security_id: signal.security_id.clone(),
        kind: CandidateKind::OpportunityBuy,
        min_quantity: signal.min_lot.max(Decimal::ONE),
        max_quantity: signal.min_lot.max(Decimal::ONE) * Decimal::from(5),
        reason_tags: vec!["opportunity_score".to_string()],
        source_weight_gap: signal.target_weight - signal.current_weight,
    }
}

fn average_down_candidate(signal: &SecuritySignal) -> OpportunityCandidate {
    OpportunityCandidate {
        security_id: signal.security_id.clone(),
        kind: CandidateKind::AverageDown,
        min_quantity: signal.min_lot.max(Decimal::ONE),
        max_quantity: signal.min_lot.max(Decimal::ONE) * Decimal::from(5),
        reason_tags: vec!["average_down".to_string()],
        source_weight_gap: signal.target_weight - signal.current_weight,
    }
}

/// Returns security ids to classify, binning missing groups as `OTHER` at
/// the call site via `Security::country_group`/`industry_group` -- the
/// identifier itself is agnostic to grouping, only to the weight/quality
/// signals above.
pub fn candidates_by_security(
    candidates: &[OpportunityCandidate],
) -> HashMap<String, Vec<OpportunityCandidate>> {
    let mut grouped: HashMap<String, Vec<OpportunityCandidate>> = HashMap::new();
    for candidate in candidates {
        grouped
            .entry(candidate.security_id.clone())
            .or_default()
            .push(candidate.clone());
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal(id: &str, target: Decimal, current: Decimal) -> SecuritySignal {
        SecuritySignal {
            security_id: id.to_string(),
            target_weight: target,
            current_weight: current,
            fundamentals_score: 0.8,
            long_term_score: 0.7,
            opportunity_score: 0.0,
            unrealized_pnl_pct: Decimal::ZERO,
            min_lot: Decimal::ONE,
            allow_buy: true,
            allow_sell: true,
        }
    }

    #[test]
    fn below_quality_gate_produces_nothing() {
        let mut s = signal("AAPL", dec!(0.10), dec!(0.02));
        s.fundamentals_score = 0.4;
        let input = OpportunityIdentifierInput {
            signals: vec![s],
            regime_score: 0.0,
        };
        assert!(identify_opportunities(&input).is_empty());
    }

    #[test]
    fn positive_gap_yields_buy_candidate() {
        let s = signal("AAPL", dec!(0.10), dec!(0.02));
        let input = OpportunityIdentifierInput {
            signals: vec![s],
            regime_score: 0.0,
        };
        let candidates = identify_opportunities(&input);
        assert!(candidates.iter().any(|c| c.kind == CandidateKind::WeightBuy));
    }

    #[test]
    fn profit_take_triggers_above_threshold() {
        let mut s = signal("AAPL", dec!(0.10), dec!(0.10));
        s.unrealized_pnl_pct = dec!(0.25);
        let input = OpportunityIdentifierInput {
            signals: vec![s],
            regime_score: 0.0,
        };
        let candidates = identify_opportunities(&input);
        assert!(candidates.iter().any(|c| c.kind == CandidateKind::ProfitTake));
    }

    #[test]
    fn high_opportunity_score_yields_opportunity_buy_even_at_target() {
        let mut s = signal("AAPL", dec!(0.10), dec!(0.10));
        s.opportunity_score = 0.9;
        let input = OpportunityIdentifierInput {
            signals: vec![s],
            regime_score: 0.0,
        };
        let candidates = identify_opportunities(&input);
        assert!(candidates.iter().any(|c| c.kind == CandidateKind::OpportunityBuy));
    }

    #[test]
    fn low_opportunity_score_does_not_yield_opportunity_buy() {
        let s = signal("AAPL", dec!(0.10), dec!(0.10));
        let input = OpportunityIdentifierInput {
            signals: vec![s],
            regime_score: 0.0,
        };
        let candidates = identify_opportunities(&input);
        assert!(!candidates.iter().any(|c| c.kind == CandidateKind::OpportunityBuy));
    }
}
