use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Append-only ledger row (§3). Immutable after write; the only writer is
/// `append_trade` (§3, §5), whether driven by the live executor or the
/// broker-sync importer reconciling external fills.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub trade_id: String,
    pub security_id: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub currency: String,
    pub executed_at: DateTime<Utc>,
    /// Broker order id; `UNIQUE` at the storage layer is the mechanical
    /// backbone of the duplicate guard exercised by `append_trade` (§8).
    pub broker_order_id: String,
}

impl Trade {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }

    pub fn signed_cash_delta(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => -(self.notional() + self.fee),
            OrderSide::Sell => self.notional() - self.fee,
        }
    }
}
