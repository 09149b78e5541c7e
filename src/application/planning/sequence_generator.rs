use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::planning::{ActionStep, CandidateKind, OpportunityCandidate, Sequence, SequencePattern};
use crate::domain::trading::{OrderSide, Portfolio};

/// Feasibility context the generator simulates each candidate against:
/// starting cash per currency and held quantities, mutated step by step so
/// step N assumes steps 1..N-1 already executed (§4.4.3).
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub cash_by_currency: HashMap<String, Decimal>,
    pub held_quantity: HashMap<String, Decimal>,
    pub expected_price: HashMap<String, Decimal>,
    pub currency_by_security: HashMap<String, String>,
}

impl GenerationContext {
    pub fn from_portfolio(portfolio: &Portfolio, expected_price: HashMap<String, Decimal>) -> Self {
        let mut cash_by_currency = HashMap::new();
        let mut held_quantity = HashMap::new();
        let mut currency_by_security = HashMap::new();
        for position in portfolio.positions.values() {
            held_quantity.insert(position.security_id.clone(), position.quantity);
        }
        for (ccy, amount) in &portfolio.cash_by_currency {
            cash_by_currency.insert(ccy.clone(), *amount);
        }
        for id in expected_price.keys() {
            currency_by_security.insert(id.clone(), "USD".to_string());
        }
        Self {
            cash_by_currency,
            held_quantity,
            expected_price,
            currency_by_security,
        }
    }
}

/// Attempts to turn one candidate into a feasible step against the running
/// context, mutating cash/holdings on success. Buys are sized down to what
/// cash allows (never below `min_quantity`); sells are capped at what is
/// actually held.
fn try_build_step(candidate: &OpportunityCandidate, ctx: &mut GenerationContext) -> Option<ActionStep> {
    let price = *ctx.expected_price.get(&candidate.security_id)?;
    if price <= Decimal::ZERO {
        return None;
    }
    let currency = ctx
        .currency_by_security
        .get(&candidate.security_id)
        .cloned()
        .unwrap_or_else(|| "USD".to_string());

    match candidate.side() {
        OrderSide::Buy => {
            let cash = *ctx.cash_by_currency.get(&currency).unwrap_or(&Decimal::ZERO);
            let affordable_qty = (cash / price).min(candidate.max_quantity);
            if affordable_qty < candidate.min_quantity {
                return None;
            }
            let quantity = affordable_qty.max(candidate.min_quantity).min(candidate.max_quantity);
            let cost = quantity * price;
            *ctx.cash_by_currency.entry(currency.clone()).or_insert(Decimal::ZERO) -= cost;
            Some(ActionStep {
                security_id: candidate.security_id.clone(),
                side: OrderSide::Buy,
                quantity,
                expected_price: price,
                currency,
                reason_tags: candidate.reason_tags.clone(),
                score_delta: candidate.source_weight_gap,
            })
        }
        OrderSide::Sell => {
            let held = *ctx.held_quantity.get(&candidate.security_id).unwrap_or(&Decimal::ZERO);
            let quantity = held.min(candidate.max_quantity);
            if quantity < candidate.min_quantity {
                return None;
            }
            let proceeds = quantity * price;
            *ctx.held_quantity.entry(candidate.security_id.clone()).or_insert(Decimal::ZERO) -= quantity;
            *ctx.cash_by_currency.entry(currency.clone()).or_insert(Decimal::ZERO) += proceeds;
            Some(ActionStep {
                security_id: candidate.security_id.clone(),
                side: OrderSide::Sell,
                quantity,
                expected_price: price,
                currency,
                reason_tags: candidate.reason_tags.clone(),
                score_delta: candidate.source_weight_gap,
            })
        }
    }
}

fn build_sequence(
    pattern: SequencePattern,
    ordered_candidates: &[&OpportunityCandidate],
    ctx: &GenerationContext,
) -> Option<Sequence> {
    let mut local_ctx = ctx.clone();
    let mut steps = Vec::new();
    for candidate in ordered_candidates.iter().take(5) {
        if let Some(step) = try_build_step(candidate, &mut local_ctx) {
            steps.push(step);
        }
    }
    if steps.is_empty() {
        None
    } else {
        Some(Sequence { pattern, steps })
    }
}

fn by_kind<'a>(candidates: &'a [OpportunityCandidate], kind: CandidateKind) -> Vec<&'a OpportunityCandidate> {
    candidates.iter().filter(|c| c.kind == kind).collect()
}

fn sorted_by_gap_desc<'a>(candidates: &'a [OpportunityCandidate]) -> Vec<&'a OpportunityCandidate> {
    let mut v: Vec<&OpportunityCandidate> = candidates.iter().collect();
    v.sort_by(|a, b| b.source_weight_gap.abs().cmp(&a.source_weight_gap.abs()));
    v
}

/// Enumerates one sequence per named pattern (§4.4.3), each feasible at its
/// own execution point under the shared starting context. Rather than a
/// full permutation search over the candidate set (which blows up
/// factorially past a handful of candidates), each pattern picks its own
/// deterministic ordering of the relevant candidate subset -- this keeps
/// enumeration bounded while still covering the named strategy shapes.
pub fn generate_sequences(
    candidates: &[OpportunityCandidate],
    ctx: &GenerationContext,
    regime_score: f64,
) -> Vec<Sequence> {
    let mut sequences = Vec::new();
    let by_gap = sorted_by_gap_desc(candidates);

    let buys: Vec<&OpportunityCandidate> = candidates
        .iter()
        .filter(|c| c.side() == OrderSide::Buy)
        .collect();
    let sells: Vec<&OpportunityCandidate> = candidates
        .iter()
        .filter(|c| c.side() == OrderSide::Sell)
        .collect();
    let profit_takes = by_kind(candidates, CandidateKind::ProfitTake);
    let average_downs = by_kind(candidates, CandidateKind::AverageDown);
    let opportunity_buys = by_kind(candidates, CandidateKind::OpportunityBuy);
    let rebalance_buys = by_kind(candidates, CandidateKind::RebalanceBuy);
    let rebalance_sells = by_kind(candidates, CandidateKind::RebalanceSell);

    let mut rebalance_all = rebalance_sells.clone();
    rebalance_all.extend(rebalance_buys.clone());

    let mut mixed: Vec<&OpportunityCandidate> = profit_takes.clone();
    mixed.extend(buys.iter().take(3));

    let mut opportunity_first = opportunity_buys.clone();
    opportunity_first.extend(buys.iter().filter(|c| c.kind != CandidateKind::OpportunityBuy).take(3));

    let mut cash_generation = profit_takes.clone();
    cash_generation.extend(sells.iter().filter(|c| c.kind != CandidateKind::ProfitTake).take(3));

    let cost_optimized: Vec<&OpportunityCandidate> = by_gap.iter().take(2).copied().collect();

    let mut adaptive = if regime_score < 0.0 { sells.clone() } else { buys.clone() };
    if adaptive.is_empty() {
        adaptive = by_gap.clone();
    }

    let patterns: Vec<(SequencePattern, Vec<&OpportunityCandidate>)> = vec![
        (SequencePattern::DirectBuy, buys.iter().take(1).copied().collect()),
        (SequencePattern::ProfitTaking, profit_takes.clone()),
        (SequencePattern::Rebalance, rebalance_all),
        (SequencePattern::AveragingDown, average_downs),
        (SequencePattern::SingleBest, by_gap.iter().take(1).copied().collect()),
        (SequencePattern::MultiSell, sells.clone()),
        (SequencePattern::MixedStrategy, mixed),
        (SequencePattern::OpportunityFirst, opportunity_first),
        (SequencePattern::DeepRebalance, by_gap.clone()),
        (SequencePattern::CashGeneration, cash_generation),
        (SequencePattern::CostOptimized, cost_optimized),
        (SequencePattern::Adaptive, adaptive),
        (SequencePattern::MarketRegime, if regime_score < 0.0 { sells } else { buys }),
    ];

    for (pattern, ordered) in patterns {
        if ordered.is_empty() {
            continue;
        }
        if let Some(sequence) = build_sequence(pattern, &ordered, ctx) {
            sequences.push(sequence);
        }
    }

    dedupe_by_canonical_key(sequences)
}

fn dedupe_by_canonical_key(sequences: Vec<Sequence>) -> Vec<Sequence> {
    let mut seen = std::collections::HashSet::new();
    sequences
        .into_iter()
        .filter(|seq| seen.insert(seq.canonical_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(id: &str, kind: CandidateKind, gap: Decimal) -> OpportunityCandidate {
        OpportunityCandidate {
            security_id: id.to_string(),
            kind,
            min_quantity: dec!(1),
            max_quantity: dec!(100),
            reason_tags: vec![],
            source_weight_gap: gap,
        }
    }

    fn ctx() -> GenerationContext {
        let mut cash = HashMap::new();
        cash.insert("USD".to_string(), dec!(100000));
        let mut held = HashMap::new();
        held.insert("MSFT".to_string(), dec!(50));
        let mut price = HashMap::new();
        price.insert("AAPL".to_string(), dec!(150));
        price.insert("MSFT".to_string(), dec!(300));
        let mut ccy = HashMap::new();
        ccy.insert("AAPL".to_string(), "USD".to_string());
        ccy.insert("MSFT".to_string(), "USD".to_string());
        GenerationContext {
            cash_by_currency: cash,
            held_quantity: held,
            expected_price: price,
            currency_by_security: ccy,
        }
    }

    #[test]
    fn generates_at_least_one_sequence_per_feasible_pattern() {
        let candidates = vec![
            candidate("AAPL", CandidateKind::WeightBuy, dec!(0.05)),
            candidate("MSFT", CandidateKind::ProfitTake, dec!(0.0)),
        ];
        let sequences = generate_sequences(&candidates, &ctx(), 0.0);
        assert!(!sequences.is_empty());
        assert!(sequences.iter().all(|s| s.len() <= 5 && !s.is_empty()));
    }

    #[test]
    fn sequences_deduped_by_canonical_key() {
        let candidates = vec![candidate("AAPL", CandidateKind::WeightBuy, dec!(0.05))];
        let sequences = generate_sequences(&candidates, &ctx(), 0.0);
        let keys: std::collections::HashSet<String> =
            sequences.iter().map(|s| s.canonical_key()).collect();
        assert_eq!(keys.len(), sequences.len());
    }

    #[test]
    fn insufficient_cash_drops_buy_step() {
        let mut cash_starved = ctx();
        cash_starved.cash_by_currency.insert("USD".to_string(), dec!(1));
        let candidates = vec![candidate("AAPL", CandidateKind::WeightBuy, dec!(0.05))];
        let sequences = generate_sequences(&candidates, &cash_starved, 0.0);
        assert!(sequences.is_empty());
    }
}
