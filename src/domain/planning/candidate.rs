use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trading::OrderSide;

/// Candidate action kinds emitted by the opportunity identifier (§4.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    WeightBuy,
    WeightSell,
    ProfitTake,
    AverageDown,
    RebalanceBuy,
    RebalanceSell,
    OpportunityBuy,
}

impl CandidateKind {
    pub fn side(&self) -> OrderSide {
        match self {
            CandidateKind::WeightBuy
            | CandidateKind::AverageDown
            | CandidateKind::RebalanceBuy
            | CandidateKind::OpportunityBuy => OrderSide::Buy,
            CandidateKind::WeightSell | CandidateKind::ProfitTake | CandidateKind::RebalanceSell => {
                OrderSide::Sell
            }
        }
    }
}

/// One candidate action produced from a weight gap or scoring signal (§4.4.2).
/// Sequences are built by composing these, not by the generator inventing
/// actions of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityCandidate {
    pub security_id: String,
    pub kind: CandidateKind,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    pub reason_tags: Vec<String>,
    pub source_weight_gap: Decimal,
}

impl OpportunityCandidate {
    pub fn side(&self) -> OrderSide {
        self.kind.side()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_side_matches_kind() {
        let buy = OpportunityCandidate {
            security_id: "AAPL".into(),
            kind: CandidateKind::RebalanceBuy,
            min_quantity: Decimal::ONE,
            max_quantity: Decimal::TEN,
            reason_tags: vec!["underweight".into()],
            source_weight_gap: Decimal::new(5, 2),
        };
        assert_eq!(buy.side(), OrderSide::Buy);

        let sell = OpportunityCandidate {
            kind: CandidateKind::ProfitTake,
            ..buy
        };
        assert_eq!(sell.side(), OrderSide::Sell);
    }
}
