use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Inputs to the optimizer (§4.4.1). `returns` is a trailing-window daily
/// return matrix (rows = days, columns = securities, same order as
/// `security_ids`); `current_weights` need not sum to 1 if cash is held.
pub struct OptimizerInput {
    pub security_ids: Vec<String>,
    pub returns: DMatrix<f64>,
    pub current_weights: HashMap<String, f64>,
    pub regime_score: f64,
    pub security_scores: HashMap<String, f64>,
    pub black_litterman_enabled: bool,
    pub kelly_fraction_base: f64,
    pub max_cvar: f64,
    pub monte_carlo_seed: u64,
}

#[derive(Debug, Clone)]
pub struct OptimizerOutput {
    pub weights: HashMap<String, Decimal>,
    pub cvar_95: f64,
    pub cvar_warning: bool,
}

/// Blends Mean-Variance and Hierarchical Risk Parity weights, applies
/// fractional-Kelly caps, and checks the result against a CVaR ceiling
/// (§4.4.1). Always returns the best feasible vector even when the CVaR
/// ceiling is breached -- the caller surfaces `cvar_warning`, it never
/// blocks the planning pipeline.
pub fn optimize(input: &OptimizerInput) -> OptimizerOutput {
    let n = input.security_ids.len();
    if n == 0 {
        return OptimizerOutput {
            weights: HashMap::new(),
            cvar_95: 0.0,
            cvar_warning: false,
        };
    }

    let cov = sample_covariance(&input.returns);
    let mu = if input.black_litterman_enabled {
        black_litterman_posterior(&cov, &input.security_ids, &input.security_scores)
    } else {
        mean_returns(&input.returns)
    };

    let w_mv = mv_weights(&mu, &cov);
    let w_hrp = hrp_weights(&cov);

    // alpha interpolated linearly by regime: 0.30 at -1, 0.50 at 0, 0.70 at +1.
    let alpha = 0.50 + 0.20 * input.regime_score.clamp(-1.0, 1.0);
    let mut blended = DVector::from_element(n, 0.0);
    for i in 0..n {
        blended[i] = alpha * w_mv[i] + (1.0 - alpha) * w_hrp[i];
    }

    apply_kelly_caps(&mut blended, &mu, &cov, input);
    normalize_nonnegative(&mut blended);

    let cvar_95 = monte_carlo_cvar(&blended, &mu, &cov, input.monte_carlo_seed);
    // bear regime tightens the effective ceiling by up to 30%.
    let regime_tightening = 1.0 - 0.30 * (-input.regime_score).clamp(0.0, 1.0);
    let effective_ceiling = input.max_cvar * regime_tightening;
    let cvar_warning = cvar_95 > effective_ceiling;

    let weights = input
        .security_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), decimal_weight(blended[i])))
        .collect();

    OptimizerOutput {
        weights,
        cvar_95,
        cvar_warning,
    }
}

fn decimal_weight(w: f64) -> Decimal {
    Decimal::from_f64_retain(w)
        .unwrap_or(Decimal::ZERO)
        .round_dp(6)
}

fn sample_covariance(returns: &DMatrix<f64>) -> DMatrix<f64> {
    let t = returns.nrows() as f64;
    let n = returns.ncols();
    let means = mean_returns(returns);
    let mut cov = DMatrix::from_element(n, n, 0.0);
    for i in 0..n {
        for j in 0..n {
            let mut acc = 0.0;
            for row in 0..returns.nrows() {
                acc += (returns[(row, i)] - means[i]) * (returns[(row, j)] - means[j]);
            }
            cov[(i, j)] = acc / (t - 1.0).max(1.0);
        }
    }
    cov
}

fn mean_returns(returns: &DMatrix<f64>) -> DVector<f64> {
    let n = returns.ncols();
    let t = returns.nrows() as f64;
    let mut means = DVector::from_element(n, 0.0);
    for j in 0..n {
        means[j] = returns.column(j).sum() / t.max(1.0);
    }
    means
}

fn correlation_from_covariance(cov: &DMatrix<f64>) -> DMatrix<f64> {
    let n = cov.nrows();
    let mut corr = DMatrix::from_element(n, n, 0.0);
    for i in 0..n {
        for j in 0..n {
            let denom = (cov[(i, i)] * cov[(j, j)]).sqrt();
            corr[(i, j)] = if denom > 1e-12 { cov[(i, j)] / denom } else { 0.0 };
        }
    }
    corr
}

/// Unconstrained tangency-style weights: solve `Sigma w = mu` via Cholesky,
/// clip negatives (no shorting in this system), caller normalizes.
fn mv_weights(mu: &DVector<f64>, cov: &DMatrix<f64>) -> DVector<f64> {
    let n = mu.len();
    let ridge = DMatrix::identity(n, n) * 1e-8;
    let regularized = cov + ridge;
    let solved = regularized
        .clone()
        .cholesky()
        .map(|chol| chol.solve(mu))
        .unwrap_or_else(|| DVector::from_element(n, 1.0 / n as f64));
    let mut w = solved;
    for i in 0..n {
        if w[i] < 0.0 || !w[i].is_finite() {
            w[i] = 0.0;
        }
    }
    w
}

enum ClusterTree {
    Leaf(usize),
    Node(Box<ClusterTree>, Box<ClusterTree>),
}

impl ClusterTree {
    fn leaves(&self) -> Vec<usize> {
        match self {
            ClusterTree::Leaf(i) => vec![*i],
            ClusterTree::Node(l, r) => {
                let mut v = l.leaves();
                v.extend(r.leaves());
                v
            }
        }
    }
}

/// Single-linkage agglomerative clustering over the distance matrix,
/// producing the dendrogram's leaf order -- the quasi-diagonalization step
/// of the HRP recipe (§4.4 expansion).
fn single_linkage_order(distance: &DMatrix<f64>) -> Vec<usize> {
    let n = distance.nrows();
    if n <= 1 {
        return (0..n).collect();
    }
    let mut trees: Vec<ClusterTree> = (0..n).map(ClusterTree::Leaf).collect();
    let mut leaves: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    while trees.len() > 1 {
        let mut best = (0usize, 1usize, f64::INFINITY);
        for i in 0..trees.len() {
            for j in (i + 1)..trees.len() {
                let mut min_d = f64::INFINITY;
                for &a in &leaves[i] {
                    for &b in &leaves[j] {
                        let d = distance[(a, b)];
                        if d < min_d {
                            min_d = d;
                        }
                    }
                }
                if min_d < best.2 {
                    best = (i, j, min_d);
                }
            }
        }
        let (i, j, _) = best;
        let tree_j = trees.remove(j);
        let tree_i = trees.remove(i);
        let leaves_j = leaves.remove(j);
        let leaves_i = leaves.remove(i);
        let mut merged_leaves = leaves_i;
        merged_leaves.extend(leaves_j);
        trees.push(ClusterTree::Node(
            Box::new(tree_i),
            Box::new(tree_j),
        ));
        leaves.push(merged_leaves);
    }
    trees.remove(0).leaves()
}

fn cluster_variance(cov: &DMatrix<f64>, items: &[usize]) -> f64 {
    let ivp: Vec<f64> = items.iter().map(|&i| 1.0 / cov[(i, i)].max(1e-12)).collect();
    let sum: f64 = ivp.iter().sum();
    let w: Vec<f64> = ivp.iter().map(|v| v / sum.max(1e-12)).collect();
    let mut variance = 0.0;
    for (a_idx, &a) in items.iter().enumerate() {
        for (b_idx, &b) in items.iter().enumerate() {
            variance += w[a_idx] * w[b_idx] * cov[(a, b)];
        }
    }
    variance
}

fn recursive_bisection(weights: &mut DVector<f64>, cov: &DMatrix<f64>, items: &[usize]) {
    if items.len() <= 1 {
        return;
    }
    let mid = items.len() / 2;
    let left = &items[..mid];
    let right = &items[mid..];
    let var_left = cluster_variance(cov, left);
    let var_right = cluster_variance(cov, right);
    let total = var_left + var_right;
    let alpha = if total > 1e-12 { 1.0 - var_left / total } else { 0.5 };
    for &i in left {
        weights[i] *= alpha;
    }
    for &i in right {
        weights[i] *= 1.0 - alpha;
    }
    recursive_bisection(weights, cov, left);
    recursive_bisection(weights, cov, right);
}

fn hrp_weights(cov: &DMatrix<f64>) -> DVector<f64> {
    let n = cov.nrows();
    let corr = correlation_from_covariance(cov);
    let distance = corr.map(|c| (0.5 * (1.0 - c)).max(0.0).sqrt());
    let order = single_linkage_order(&distance);
    let mut weights = DVector::from_element(n, 1.0);
    recursive_bisection(&mut weights, cov, &order);
    let sum: f64 = weights.iter().sum();
    if sum > 1e-12 {
        weights /= sum;
    }
    weights
}

/// Black-Litterman posterior returns with an equal-weight market prior and
/// a view matrix derived from per-security scores (§4.4 expansion); each
/// view targets exactly one security so `P` is the identity matrix, which
/// collapses the usual mixture to a per-asset weighted blend.
fn black_litterman_posterior(
    cov: &DMatrix<f64>,
    security_ids: &[String],
    security_scores: &HashMap<String, f64>,
) -> DVector<f64> {
    let n = security_ids.len();
    let tau = 0.05;
    let equal_weight = DVector::from_element(n, 1.0 / n as f64);
    let pi = cov * &equal_weight;

    let mut posterior = DVector::from_element(n, 0.0);
    for i in 0..n {
        let view_return = security_scores.get(&security_ids[i]).copied().unwrap_or(0.0);
        let prior_var = (tau * cov[(i, i)]).max(1e-8);
        let view_var = prior_var.max(1e-8);
        let prior_precision = 1.0 / prior_var;
        let view_precision = 1.0 / view_var;
        posterior[i] =
            (pi[i] * prior_precision + view_return * view_precision) / (prior_precision + view_precision);
    }
    posterior
}

/// Fractional-Kelly cap per security: multiplier in [0.25, 0.75] scaled by
/// confidence (security score) and regime, applied as a hard ceiling on the
/// blended weight (§4.4.1).
fn apply_kelly_caps(
    weights: &mut DVector<f64>,
    mu: &DVector<f64>,
    cov: &DMatrix<f64>,
    input: &OptimizerInput,
) {
    let regime_factor = (0.5 + 0.5 * input.regime_score.clamp(-1.0, 1.0)).clamp(0.0, 1.0);
    for (i, id) in input.security_ids.iter().enumerate() {
        let confidence = input
            .security_scores
            .get(id)
            .copied()
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);
        let multiplier = (0.25 + 0.50 * confidence * regime_factor).clamp(0.25, 0.75);
        let variance = cov[(i, i)].max(1e-8);
        let kelly_optimal = (mu[i] / variance).clamp(0.0, 1.0);
        let cap = (multiplier * kelly_optimal * input.kelly_fraction_base.max(0.01)).clamp(0.0, 1.0);
        if weights[i] > cap {
            weights[i] = cap;
        }
    }
}

fn normalize_nonnegative(weights: &mut DVector<f64>) {
    for w in weights.iter_mut() {
        if *w < 0.0 || !w.is_finite() {
            *w = 0.0;
        }
    }
    let sum: f64 = weights.iter().sum();
    if sum > 1e-12 {
        *weights /= sum;
    }
}

/// 95% CVaR via correlated Monte Carlo GBM paths over a 20-day horizon
/// (§4.4 expansion): draws are seeded from an explicit `u64` so runs are
/// reproducible (§8 determinism property), using the covariance's Cholesky
/// factor to correlate the per-asset normal shocks.
fn monte_carlo_cvar(weights: &DVector<f64>, mu: &DVector<f64>, cov: &DMatrix<f64>, seed: u64) -> f64 {
    const PATHS: usize = 10_000;
    const HORIZON_DAYS: usize = 20;
    let n = weights.len();
    let ridge = DMatrix::identity(n, n) * 1e-10;
    let Some(chol) = (cov + ridge).cholesky() else {
        return 0.0;
    };
    let l = chol.l();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut portfolio_returns: Vec<f64> = Vec::with_capacity(PATHS);

    for _ in 0..PATHS {
        let mut cumulative = DVector::from_element(n, 0.0);
        for _ in 0..HORIZON_DAYS {
            let z: DVector<f64> = DVector::from_iterator(n, (0..n).map(|_| StandardNormal.sample(&mut rng)));
            let correlated = &l * z;
            for i in 0..n {
                cumulative[i] += mu[i] + correlated[i];
            }
        }
        let portfolio_return: f64 = (0..n).map(|i| weights[i] * cumulative[i]).sum();
        portfolio_returns.push(portfolio_return);
    }

    portfolio_returns.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let cutoff = ((PATHS as f64) * 0.05).ceil() as usize;
    let tail = &portfolio_returns[..cutoff.max(1)];
    let mean_tail_loss: f64 = tail.iter().map(|r| -r).sum::<f64>() / tail.len() as f64;
    mean_tail_loss.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> OptimizerInput {
        let security_ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let rows = 60;
        let mut returns = DMatrix::from_element(rows, 3, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for r in 0..rows {
            for c in 0..3 {
                let shock: f64 = StandardNormal.sample(&mut rng);
                returns[(r, c)] = 0.0005 + 0.01 * shock;
            }
        }
        let mut current_weights = HashMap::new();
        current_weights.insert("A".to_string(), 0.4);
        current_weights.insert("B".to_string(), 0.3);
        current_weights.insert("C".to_string(), 0.3);
        let mut security_scores = HashMap::new();
        security_scores.insert("A".to_string(), 0.8);
        security_scores.insert("B".to_string(), 0.6);
        security_scores.insert("C".to_string(), 0.5);

        OptimizerInput {
            security_ids,
            returns,
            current_weights,
            regime_score: 0.0,
            security_scores,
            black_litterman_enabled: false,
            kelly_fraction_base: 0.5,
            max_cvar: 0.15,
            monte_carlo_seed: 42,
        }
    }

    #[test]
    fn weights_sum_to_approximately_one() {
        let output = optimize(&sample_input());
        let total: Decimal = output.weights.values().copied().sum();
        assert!((total - Decimal::ONE).abs() < Decimal::new(1, 3));
    }

    #[test]
    fn deterministic_across_runs_with_same_seed() {
        let input = sample_input();
        let a = optimize(&input);
        let b = optimize(&input);
        assert_eq!(a.cvar_95, b.cvar_95);
        for (id, w) in &a.weights {
            assert_eq!(w, b.weights.get(id).unwrap());
        }
    }

    #[test]
    fn black_litterman_changes_weights() {
        let mut bl_input = sample_input();
        bl_input.black_litterman_enabled = true;
        let base = optimize(&sample_input());
        let bl = optimize(&bl_input);
        assert_ne!(base.weights, bl.weights);
    }

    #[test]
    fn hrp_handles_single_security() {
        let cov = DMatrix::from_element(1, 1, 0.02);
        let w = hrp_weights(&cov);
        assert_eq!(w.len(), 1);
        assert!((w[0] - 1.0).abs() < 1e-9);
    }
}
