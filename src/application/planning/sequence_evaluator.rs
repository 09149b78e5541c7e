//! Simulates and scores each candidate sequence (§4.4.4): copy-on-write
//! portfolio simulation, weighted end-state scoring, Monte Carlo/scenario
//! blending into a robust score, and priority-batched early termination.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as RandDistribution, StandardNormal};
use rayon::prelude::*;
use rust_decimal::Decimal;
use statrs::statistics::{Data, Distribution};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::domain::planning::{ScoreBreakdown, ScoringWeights, Sequence};
use crate::domain::trading::{FeeModel, OrderSide, Portfolio};

#[derive(Debug, Clone)]
pub struct SecurityMeta {
    pub country: String,
    pub industry: String,
    pub quality_score: f64,
    /// Assumed daily return volatility, used only for the scenario/Monte
    /// Carlo risk terms below -- the optimizer's own covariance estimate
    /// feeds `4.4.1`, this is a cheaper per-security proxy for scoring a
    /// handful of candidate sequences.
    pub daily_volatility: f64,
}

pub struct EvaluatorInput<'a> {
    pub starting_portfolio: &'a Portfolio,
    pub prices: &'a HashMap<String, Decimal>,
    pub target_weights: &'a HashMap<String, Decimal>,
    pub security_meta: &'a HashMap<String, SecurityMeta>,
    pub base_currency: &'a str,
    pub scoring_weights: ScoringWeights,
    pub regime_score: f64,
    pub monte_carlo_seed: u64,
    pub monte_carlo_paths: usize,
    pub fee_model: &'a dyn FeeModel,
}

#[derive(Debug, Clone)]
pub struct EvaluatedSequence {
    pub sequence: Sequence,
    pub breakdown: ScoreBreakdown,
    pub base_score: f64,
    pub robust_score: f64,
    pub aggregate_transaction_cost: Decimal,
}

const EARLY_TERMINATION_MIN_EVALUATED: usize = 10;
const EARLY_TERMINATION_WINDOW: usize = 5;
const BATCH_SIZE: usize = 4;
const SCENARIO_SHIFTS: [f64; 4] = [-0.10, -0.05, 0.05, 0.10];

/// Deterministic per-sequence seed derived from the shared Monte Carlo seed
/// and the sequence's own canonical key, so re-evaluating the same
/// sequence against the same seed reproduces the same robust score (§8
/// determinism property) without every sequence drawing from the same RNG
/// stream in generation order.
fn sequence_seed(base_seed: u64, sequence: &Sequence) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    base_seed.hash(&mut hasher);
    sequence.canonical_key().hash(&mut hasher);
    hasher.finish()
}

fn simulate_end_state(
    starting: &Portfolio,
    sequence: &Sequence,
    prices: &HashMap<String, Decimal>,
    fee_model: &dyn FeeModel,
) -> (Portfolio, Decimal) {
    let mut portfolio = starting.clone();
    let mut total_cost = Decimal::ZERO;
    for step in &sequence.steps {
        let cost = fee_model.calculate_cost(step.quantity, step.expected_price, step.side);
        total_cost += cost.fee;
        portfolio.apply_fill(
            &step.security_id,
            step.side,
            step.quantity,
            step.expected_price,
            cost.fee,
            &step.currency,
        );
    }
    let _ = prices;
    (portfolio, total_cost)
}

fn herfindahl_diversification(weights_by_group: &HashMap<String, f64>) -> f64 {
    if weights_by_group.is_empty() {
        return 0.0;
    }
    let hhi: f64 = weights_by_group.values().map(|w| w * w).sum();
    (1.0 - hhi).clamp(0.0, 1.0)
}

fn group_weights(
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
    base_currency: &str,
    group_of: impl Fn(&str) -> String,
) -> HashMap<String, f64> {
    let equity = portfolio.total_equity(prices, base_currency);
    if equity.is_zero() {
        return HashMap::new();
    }
    let mut grouped: HashMap<String, f64> = HashMap::new();
    for (id, pos) in &portfolio.positions {
        let price = prices.get(id).copied().unwrap_or(pos.avg_cost);
        let weight = ((pos.quantity * price) / equity).to_string().parse::<f64>().unwrap_or(0.0);
        *grouped.entry(group_of(id)).or_insert(0.0) += weight.max(0.0);
    }
    grouped
}

fn expected_return_alignment(
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
    target_weights: &HashMap<String, Decimal>,
    base_currency: &str,
) -> f64 {
    let end_weights = portfolio.weights(prices, base_currency);
    if target_weights.is_empty() {
        return 0.5;
    }
    let mut total_gap = 0.0;
    let mut n = 0usize;
    for (id, target) in target_weights {
        let current = end_weights.get(id).copied().unwrap_or(Decimal::ZERO);
        let gap = (*target - current).abs().to_string().parse::<f64>().unwrap_or(0.0);
        total_gap += gap;
        n += 1;
    }
    if n == 0 {
        return 0.5;
    }
    (1.0 - (total_gap / n as f64).min(1.0)).clamp(0.0, 1.0)
}

fn quality_score(
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
    base_currency: &str,
    security_meta: &HashMap<String, SecurityMeta>,
) -> f64 {
    let weights = portfolio.weights(prices, base_currency);
    if weights.is_empty() {
        return 0.5;
    }
    let mut acc = 0.0;
    let mut total_weight = 0.0;
    for (id, w) in &weights {
        let weight_f = w.to_string().parse::<f64>().unwrap_or(0.0).max(0.0);
        let quality = security_meta.get(id).map(|m| m.quality_score).unwrap_or(0.5);
        acc += weight_f * quality;
        total_weight += weight_f;
    }
    if total_weight <= 0.0 {
        0.5
    } else {
        (acc / total_weight).clamp(0.0, 1.0)
    }
}

/// Draws `paths` iid-normal equity-return paths over a 20-day horizon for
/// the sequence's end-state portfolio and returns (volatility, cvar_95,
/// max_drawdown) as fractions of equity -- the risk terms in the weighted
/// end-state score, plus the ingredients for the robust-score confidence.
fn monte_carlo_risk(
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
    base_currency: &str,
    security_meta: &HashMap<String, SecurityMeta>,
    seed: u64,
    paths: usize,
) -> (f64, f64, f64) {
    let equity = portfolio
        .total_equity(prices, base_currency)
        .to_string()
        .parse::<f64>()
        .unwrap_or(0.0);
    if equity <= 0.0 || portfolio.positions.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let weights = portfolio.weights(prices, base_currency);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let horizon_days = 20.0_f64;

    let mut final_returns: Vec<f64> = Vec::with_capacity(paths.max(1));
    for _ in 0..paths.max(1) {
        let mut cumulative = 0.0;
        for (id, w) in &weights {
            let weight_f = w.to_string().parse::<f64>().unwrap_or(0.0);
            let vol = security_meta.get(id).map(|m| m.daily_volatility).unwrap_or(0.015);
            let shock: f64 = StandardNormal.sample(&mut rng);
            cumulative += weight_f * vol * horizon_days.sqrt() * shock;
        }
        final_returns.push(cumulative);
    }

    // std_dev over the simulated path returns (f64 boundary for statrs, same
    // pattern the z-score strategy uses for its own lookback window).
    let volatility = Data::new(final_returns.clone()).std_dev().unwrap_or(0.0);

    let mut sorted = final_returns.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let tail_count = ((sorted.len() as f64) * 0.05).ceil().max(1.0) as usize;
    let cvar = -sorted.iter().take(tail_count).sum::<f64>() / tail_count as f64;
    let max_drawdown = -sorted.first().copied().unwrap_or(0.0);

    (volatility.max(0.0), cvar.max(0.0), max_drawdown.max(0.0))
}

fn evaluate_one(sequence: Sequence, input: &EvaluatorInput) -> EvaluatedSequence {
    let (end_state, cost) = simulate_end_state(
        input.starting_portfolio,
        &sequence,
        input.prices,
        input.fee_model,
    );

    let country_weights = group_weights(&end_state, input.prices, input.base_currency, |id| {
        input
            .security_meta
            .get(id)
            .map(|m| m.country.clone())
            .unwrap_or_else(|| "OTHER".to_string())
    });
    let industry_weights = group_weights(&end_state, input.prices, input.base_currency, |id| {
        input
            .security_meta
            .get(id)
            .map(|m| m.industry.clone())
            .unwrap_or_else(|| "OTHER".to_string())
    });

    let seed = sequence_seed(input.monte_carlo_seed, &sequence);
    let (volatility, cvar, drawdown) = monte_carlo_risk(
        &end_state,
        input.prices,
        input.base_currency,
        input.security_meta,
        seed,
        input.monte_carlo_paths,
    );

    let equity = end_state
        .total_equity(input.prices, input.base_currency)
        .max(Decimal::ONE);
    let cost_fraction = (cost / equity).to_string().parse::<f64>().unwrap_or(0.0);

    let regime_fit = if input.regime_score < 0.0 {
        // bear regime rewards sequences that reduce net exposure.
        let sells = sequence.steps.iter().filter(|s| s.side == OrderSide::Sell).count();
        (sells as f64 / sequence.steps.len().max(1) as f64).clamp(0.0, 1.0)
    } else {
        let buys = sequence.steps.iter().filter(|s| s.side == OrderSide::Buy).count();
        (buys as f64 / sequence.steps.len().max(1) as f64).clamp(0.0, 1.0)
    };

    let breakdown = ScoreBreakdown {
        diversification_country: herfindahl_diversification(&country_weights),
        diversification_industry: herfindahl_diversification(&industry_weights),
        diversification_quality: quality_score(&end_state, input.prices, input.base_currency, input.security_meta),
        expected_return_alignment: expected_return_alignment(
            &end_state,
            input.prices,
            input.target_weights,
            input.base_currency,
        ),
        risk_cvar: (1.0 - cvar).clamp(0.0, 1.0),
        risk_volatility: (1.0 - volatility).clamp(0.0, 1.0),
        risk_drawdown: (1.0 - drawdown).clamp(0.0, 1.0),
        transaction_cost: (1.0 - cost_fraction.min(1.0)).clamp(0.0, 1.0),
        regime_fit,
    };

    let base_score = breakdown.weighted_sum(&input.scoring_weights);

    // Scenario shifts: re-price the end state at +/-5%/+/-10% and measure
    // how much the breakdown's equity-sensitive terms move; a sequence
    // whose score barely changes under stress is more robust.
    let mut scenario_deltas = Vec::with_capacity(SCENARIO_SHIFTS.len());
    for shift in SCENARIO_SHIFTS {
        let factor = Decimal::from_f64_retain(1.0 + shift).unwrap_or(Decimal::ONE);
        let shifted_prices: HashMap<String, Decimal> = input
            .prices
            .iter()
            .map(|(id, price)| (id.clone(), *price * factor))
            .collect();
        let shifted_equity = end_state.total_equity(&shifted_prices, input.base_currency).max(Decimal::ONE);
        let base_equity = equity;
        let delta = ((shifted_equity - base_equity) / base_equity)
            .to_string()
            .parse::<f64>()
            .unwrap_or(0.0);
        scenario_deltas.push(delta.abs());
    }
    let noise_penalty = -(scenario_deltas.iter().sum::<f64>() / scenario_deltas.len() as f64) * 0.1;

    // Confidence shrinks as Monte Carlo volatility grows -- a sequence
    // whose simulated outcomes disagree widely is trusted less.
    let confidence = (1.0 - volatility.min(1.0)).clamp(0.1, 1.0);
    let robust_score = base_score * confidence + noise_penalty;

    EvaluatedSequence {
        sequence,
        breakdown,
        base_score,
        robust_score,
        aggregate_transaction_cost: cost,
    }
}

/// Evaluates all sequences, batching in priority order (largest notional
/// first, a proxy for "most impactful") and stopping once at least
/// `EARLY_TERMINATION_MIN_EVALUATED` have been scored and the best robust
/// score hasn't improved over the last `EARLY_TERMINATION_WINDOW` of them
/// (§4.4.4). Each batch is scored in parallel via `rayon` since this is
/// pure CPU work, isolated from the async worker pool that dispatched it.
pub fn evaluate_sequences(mut sequences: Vec<Sequence>, input: &EvaluatorInput) -> Vec<EvaluatedSequence> {
    sequences.sort_by(|a, b| b.total_notional().cmp(&a.total_notional()));

    let mut results = Vec::with_capacity(sequences.len());
    let mut best_score = f64::NEG_INFINITY;
    let mut rounds_without_improvement = 0usize;

    for batch in sequences.chunks(BATCH_SIZE) {
        let scored: Vec<EvaluatedSequence> = batch
            .par_iter()
            .cloned()
            .map(|sequence| evaluate_one(sequence, input))
            .collect();

        let mut improved = false;
        for evaluated in &scored {
            if evaluated.robust_score > best_score {
                best_score = evaluated.robust_score;
                improved = true;
            }
        }
        results.extend(scored);

        if improved {
            rounds_without_improvement = 0;
        } else {
            rounds_without_improvement += 1;
        }

        if results.len() >= EARLY_TERMINATION_MIN_EVALUATED
            && rounds_without_improvement * BATCH_SIZE >= EARLY_TERMINATION_WINDOW
        {
            break;
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::planning::{ActionStep, SequencePattern};
    use crate::domain::trading::FixedPercentFeeModel;
    use rust_decimal_macros::dec;

    fn fee_model() -> FixedPercentFeeModel {
        FixedPercentFeeModel::new(dec!(1), dec!(0.001))
    }

    fn meta() -> HashMap<String, SecurityMeta> {
        let mut m = HashMap::new();
        m.insert(
            "AAPL".to_string(),
            SecurityMeta {
                country: "US".into(),
                industry: "TECH".into(),
                quality_score: 0.8,
                daily_volatility: 0.015,
            },
        );
        m
    }

    fn buy_sequence() -> Sequence {
        Sequence {
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
        }
    }

    #[test]
    fn evaluation_is_deterministic_given_same_seed() {
        let portfolio = Portfolio::new();
        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), dec!(150));
        let mut target = HashMap::new();
        target.insert("AAPL".to_string(), dec!(0.5));
        let meta = meta();
        let fee = fee_model();

        let input = EvaluatorInput {
            starting_portfolio: &portfolio,
            prices: &prices,
            target_weights: &target,
            security_meta: &meta,
            base_currency: "USD",
            scoring_weights: ScoringWeights::default(),
            regime_score: 0.0,
            monte_carlo_seed: 42,
            monte_carlo_paths: 50,
            fee_model: &fee,
        };

        let r1 = evaluate_sequences(vec![buy_sequence()], &input);
        let r2 = evaluate_sequences(vec![buy_sequence()], &input);
        assert_eq!(r1[0].robust_score, r2[0].robust_score);
    }

    #[test]
    fn buy_sequence_reduces_cash_and_scores_nonzero() {
        let mut portfolio = Portfolio::new();
        portfolio.cash_by_currency.insert("USD".to_string(), dec!(100000));
        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), dec!(150));
        let target = HashMap::new();
        let meta = meta();
        let fee = fee_model();

        let input = EvaluatorInput {
            starting_portfolio: &portfolio,
            prices: &prices,
            target_weights: &target,
            security_meta: &meta,
            base_currency: "USD",
            scoring_weights: ScoringWeights::default(),
            regime_score: 0.0,
            monte_carlo_seed: 7,
            monte_carlo_paths: 20,
            fee_model: &fee,
        };

        let results = evaluate_sequences(vec![buy_sequence()], &input);
        assert_eq!(results.len(), 1);
        assert!(results[0].aggregate_transaction_cost > Decimal::ZERO);
    }
}
