use serde::{Deserialize, Serialize};

/// Weighted-sum configuration for sequence end-state scoring (§4.4.4).
/// Weights need not sum to 1; the evaluator normalizes at the point of use,
/// which lets operators tune one term without rebalancing all the others.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub diversification_country: f64,
    pub diversification_industry: f64,
    pub diversification_quality: f64,
    pub expected_return_alignment: f64,
    pub risk_cvar: f64,
    pub risk_volatility: f64,
    pub risk_drawdown: f64,
    pub transaction_cost: f64,
    pub regime_fit: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            diversification_country: 0.10,
            diversification_industry: 0.10,
            diversification_quality: 0.10,
            expected_return_alignment: 0.25,
            risk_cvar: 0.15,
            risk_volatility: 0.10,
            risk_drawdown: 0.10,
            transaction_cost: 0.05,
            regime_fit: 0.05,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.diversification_country
            + self.diversification_industry
            + self.diversification_quality
            + self.expected_return_alignment
            + self.risk_cvar
            + self.risk_volatility
            + self.risk_drawdown
            + self.transaction_cost
            + self.regime_fit
    }
}

/// Per-term breakdown feeding into a sequence's base score (§4.4.4), kept
/// around alongside the scalar so the plan narrative can explain "which
/// scores improve, which risks remain" without recomputing anything.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub diversification_country: f64,
    pub diversification_industry: f64,
    pub diversification_quality: f64,
    pub expected_return_alignment: f64,
    pub risk_cvar: f64,
    pub risk_volatility: f64,
    pub risk_drawdown: f64,
    pub transaction_cost: f64,
    pub regime_fit: f64,
}

impl ScoreBreakdown {
    pub fn weighted_sum(&self, weights: &ScoringWeights) -> f64 {
        let total_weight = weights.total().max(f64::EPSILON);
        (self.diversification_country * weights.diversification_country
            + self.diversification_industry * weights.diversification_industry
            + self.diversification_quality * weights.diversification_quality
            + self.expected_return_alignment * weights.expected_return_alignment
            + self.risk_cvar * weights.risk_cvar
            + self.risk_volatility * weights.risk_volatility
            + self.risk_drawdown * weights.risk_drawdown
            + self.transaction_cost * weights.transaction_cost
            + self.regime_fit * weights.regime_fit)
            / total_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let weights = ScoringWeights::default();
        assert!((weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_breakdown_matches_uniform_weight() {
        let breakdown = ScoreBreakdown {
            diversification_country: 1.0,
            diversification_industry: 1.0,
            diversification_quality: 1.0,
            expected_return_alignment: 1.0,
            risk_cvar: 1.0,
            risk_volatility: 1.0,
            risk_drawdown: 1.0,
            transaction_cost: 1.0,
            regime_fit: 1.0,
        };
        let weights = ScoringWeights::default();
        assert!((breakdown.weighted_sum(&weights) - 1.0).abs() < 1e-9);
    }
}
