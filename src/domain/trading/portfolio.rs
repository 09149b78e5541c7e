use crate::domain::securities::Security;
use crate::domain::trading::position::Position;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Aggregate portfolio state: security positions, cash-as-security
/// balances, and the set of order ids awaiting a broker fill. This is the
/// exact input the Portfolio Hasher (§4.3) fingerprints.
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    /// Keyed by `security_id`, excludes cash (kept separately for the
    /// invariant in §3: "for every currency held there exists exactly one
    /// `CASH:<CCY>` position").
    pub positions: HashMap<String, Position>,
    pub cash_by_currency: HashMap<String, Decimal>,
    pub pending_order_ids: Vec<String>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cash(&self, currency: &str) -> Decimal {
        self.cash_by_currency
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn position(&self, security_id: &str) -> Option<&Position> {
        self.positions.get(security_id)
    }

    pub fn total_equity(&self, prices: &HashMap<String, Decimal>, base_currency: &str) -> Decimal {
        let mut equity = self.cash(base_currency);
        for (id, pos) in &self.positions {
            let price = prices.get(id).copied().unwrap_or(pos.avg_cost);
            equity += pos.quantity * price;
        }
        equity
    }

    /// Weight of each security as a fraction of total equity, used as the
    /// "current weights" input to the opportunity identifier (§4.4.2).
    pub fn weights(
        &self,
        prices: &HashMap<String, Decimal>,
        base_currency: &str,
    ) -> HashMap<String, Decimal> {
        let equity = self.total_equity(prices, base_currency);
        if equity.is_zero() {
            return HashMap::new();
        }
        self.positions
            .iter()
            .map(|(id, pos)| {
                let price = prices.get(id).copied().unwrap_or(pos.avg_cost);
                (id.clone(), (pos.quantity * price) / equity)
            })
            .collect()
    }

    /// Apply a fill in place: update quantity/avg_cost for `security_id` and
    /// debit/credit the cash bucket for `currency`. Used by the sequence
    /// simulator's copy-on-write snapshots (§4.4.4) and by the live
    /// executor after a broker fill (§4.5).
    pub fn apply_fill(
        &mut self,
        security_id: &str,
        side: crate::domain::trading::trade::OrderSide,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        currency: &str,
    ) {
        use crate::domain::trading::trade::OrderSide;
        let entry = self
            .positions
            .entry(security_id.to_string())
            .or_insert_with(|| Position::new(security_id, Decimal::ZERO, Decimal::ZERO));

        match side {
            OrderSide::Buy => {
                let new_qty = entry.quantity + quantity;
                if new_qty.is_zero() {
                    entry.avg_cost = Decimal::ZERO;
                } else {
                    entry.avg_cost =
                        (entry.avg_cost * entry.quantity + price * quantity) / new_qty;
                }
                entry.quantity = new_qty;
                *self.cash_by_currency.entry(currency.to_string()).or_default() -=
                    quantity * price + fee;
            }
            OrderSide::Sell => {
                entry.quantity -= quantity;
                *self.cash_by_currency.entry(currency.to_string()).or_default() +=
                    quantity * price - fee;
            }
        }
        entry.market_value = entry.quantity * price;
        entry.as_of = chrono::Utc::now();

        if entry.quantity.is_zero() {
            self.positions.remove(security_id);
        }
    }

    pub fn active_security_ids<'a>(&self, universe: &'a [Security]) -> Vec<&'a str> {
        universe
            .iter()
            .filter(|s| s.active && !s.is_cash())
            .map(|s| s.security_id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::trade::OrderSide;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_updates_avg_cost_and_debits_cash() {
        let mut p = Portfolio::new();
        p.cash_by_currency.insert("EUR".into(), dec!(10000));
        p.apply_fill("AAPL", OrderSide::Buy, dec!(10), dec!(100), dec!(1), "EUR");
        assert_eq!(p.position("AAPL").unwrap().quantity, dec!(10));
        assert_eq!(p.cash("EUR"), dec!(10000) - dec!(1000) - dec!(1));
    }

    #[test]
    fn sell_to_zero_removes_position() {
        let mut p = Portfolio::new();
        p.positions
            .insert("AAPL".into(), Position::new("AAPL", dec!(10), dec!(100)));
        p.cash_by_currency.insert("EUR".into(), dec!(0));
        p.apply_fill("AAPL", OrderSide::Sell, dec!(10), dec!(110), dec!(1), "EUR");
        assert!(p.position("AAPL").is_none());
        assert_eq!(p.cash("EUR"), dec!(1100) - dec!(1));
    }

    #[test]
    fn total_equity_sums_cash_and_positions() {
        let mut p = Portfolio::new();
        p.cash_by_currency.insert("EUR".into(), dec!(5000));
        p.positions
            .insert("AAPL".into(), Position::new("AAPL", dec!(10), dec!(100)));
        let mut prices = HashMap::new();
        prices.insert("AAPL".into(), dec!(110));
        assert_eq!(p.total_equity(&prices, "EUR"), dec!(5000) + dec!(1100));
    }
}
