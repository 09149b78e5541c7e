use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// (security_id, quantity, avg_cost, market_value, as_of) per §3.
///
/// Cash balances are represented as positions against the synthetic
/// `CASH:<CCY>` security (§2 glossary) -- there is exactly one such position
/// per currency held, enforced by `Portfolio::cash_by_currency`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub security_id: String,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub market_value: Decimal,
    pub as_of: DateTime<Utc>,
}

impl Position {
    pub fn new(security_id: impl Into<String>, quantity: Decimal, avg_cost: Decimal) -> Self {
        Self {
            security_id: security_id.into(),
            quantity,
            avg_cost,
            market_value: quantity * avg_cost,
            as_of: Utc::now(),
        }
    }

    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_cost
    }

    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        (current_price - self.avg_cost) * self.quantity
    }
}
