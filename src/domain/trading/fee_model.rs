//! Transaction cost model used by the sequence simulator (§4.4.3/§4.4.4) and
//! by the plan builder's cost ceiling (§4.4.5).

use crate::domain::trading::trade::OrderSide;
use rust_decimal::Decimal;
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeCost {
    pub fee: Decimal,
    pub total_impact: Decimal,
}

pub trait FeeModel: Debug + Send + Sync {
    fn calculate_cost(&self, quantity: Decimal, price: Decimal, side: OrderSide) -> TradeCost;
}

/// `transaction_cost_fixed + transaction_cost_percent * notional` (§6.4).
#[derive(Debug, Clone, Copy)]
pub struct FixedPercentFeeModel {
    pub fixed: Decimal,
    pub percent: Decimal,
}

impl FixedPercentFeeModel {
    pub fn new(fixed: Decimal, percent: Decimal) -> Self {
        Self { fixed, percent }
    }
}

impl FeeModel for FixedPercentFeeModel {
    fn calculate_cost(&self, quantity: Decimal, price: Decimal, _side: OrderSide) -> TradeCost {
        let notional = quantity * price;
        let fee = self.fixed + notional * self.percent;
        TradeCost {
            fee,
            total_impact: fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fixed_plus_percent() {
        let model = FixedPercentFeeModel::new(dec!(1.0), dec!(0.001));
        let cost = model.calculate_cost(dec!(10), dec!(100), OrderSide::Buy);
        // fixed 1.0 + 0.001 * 1000 = 2.0
        assert_eq!(cost.fee, dec!(2.0));
    }
}
