//! Portfolio Hasher (§4.3): a stable fingerprint of (positions,
//! cash-by-currency, pending orders, active securities) used to key plans.
//! Downstream components detect "portfolio changed" by comparing hashes
//! across ticks (§4.5).

use crate::domain::securities::Security;
use crate::domain::trading::portfolio::Portfolio;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Round to 6 decimal places and render as a fixed-format string so the
/// hash is stable across floating/Decimal scale differences (§4.3, §9).
fn canonical_decimal(value: Decimal) -> String {
    format!("{:.6}", value.round_dp(6))
}

/// Computes the stable SHA-256 fingerprint described in §4.3:
/// - positions sorted by security symbol (byte-wise), serialized as
///   `(symbol, quantity@6dp, avg_cost@6dp)`
/// - cash entries sorted by currency, appended
/// - pending order ids sorted, appended
///
/// `active_securities` supplies the symbol for each security id and is
/// also folded into the hash so a universe change (activation/deactivation)
/// invalidates stale plans even when positions are unchanged.
pub fn portfolio_hash(portfolio: &Portfolio, active_securities: &[Security]) -> String {
    let symbol_of = |security_id: &str| -> String {
        active_securities
            .iter()
            .find(|s| s.security_id == security_id)
            .map(|s| s.symbol.clone())
            .unwrap_or_else(|| security_id.to_string())
    };

    let mut position_lines: Vec<String> = portfolio
        .positions
        .iter()
        .map(|(id, pos)| {
            format!(
                "{}|{}|{}",
                symbol_of(id),
                canonical_decimal(pos.quantity),
                canonical_decimal(pos.avg_cost)
            )
        })
        .collect();
    position_lines.sort();

    let mut cash_lines: Vec<String> = portfolio
        .cash_by_currency
        .iter()
        .map(|(ccy, amount)| format!("{}|{}", ccy, canonical_decimal(*amount)))
        .collect();
    cash_lines.sort();

    let mut order_ids = portfolio.pending_order_ids.clone();
    order_ids.sort();

    let mut active_symbols: Vec<String> = active_securities
        .iter()
        .filter(|s| s.active)
        .map(|s| s.symbol.clone())
        .collect();
    active_symbols.sort();

    let mut hasher = Sha256::new();
    hasher.update(b"positions:");
    hasher.update(position_lines.join(";").as_bytes());
    hasher.update(b"|cash:");
    hasher.update(cash_lines.join(";").as_bytes());
    hasher.update(b"|orders:");
    hasher.update(order_ids.join(";").as_bytes());
    hasher.update(b"|active:");
    hasher.update(active_symbols.join(";").as_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::position::Position;
    use rust_decimal_macros::dec;

    fn sample_universe() -> Vec<Security> {
        vec![
            Security {
                security_id: "sec-aapl".into(),
                symbol: "AAPL".into(),
                isin: None,
                currency: "USD".into(),
                country: Some("US".into()),
                industry: None,
                min_lot: dec!(1),
                allow_buy: true,
                allow_sell: true,
                active: true,
            },
            Security {
                security_id: "sec-asml".into(),
                symbol: "ASML".into(),
                isin: None,
                currency: "EUR".into(),
                country: Some("NL".into()),
                industry: None,
                min_lot: dec!(1),
                allow_buy: true,
                allow_sell: true,
                active: true,
            },
        ]
    }

    #[test]
    fn stable_under_permutation() {
        let universe = sample_universe();
        let mut p1 = Portfolio::new();
        p1.positions
            .insert("sec-aapl".into(), Position::new("sec-aapl", dec!(10), dec!(100)));
        p1.positions
            .insert("sec-asml".into(), Position::new("sec-asml", dec!(5), dec!(600)));
        p1.cash_by_currency.insert("EUR".into(), dec!(5000));
        p1.cash_by_currency.insert("USD".into(), dec!(0));

        let mut p2 = Portfolio::new();
        p2.positions
            .insert("sec-asml".into(), Position::new("sec-asml", dec!(5), dec!(600)));
        p2.positions
            .insert("sec-aapl".into(), Position::new("sec-aapl", dec!(10), dec!(100)));
        p2.cash_by_currency.insert("USD".into(), dec!(0));
        p2.cash_by_currency.insert("EUR".into(), dec!(5000));

        assert_eq!(portfolio_hash(&p1, &universe), portfolio_hash(&p2, &universe));
    }

    #[test]
    fn stable_under_repeated_computation() {
        let universe = sample_universe();
        let mut p = Portfolio::new();
        p.positions
            .insert("sec-aapl".into(), Position::new("sec-aapl", dec!(10), dec!(100)));
        let h1 = portfolio_hash(&p, &universe);
        let h2 = portfolio_hash(&p, &universe);
        assert_eq!(h1, h2);
    }

    #[test]
    fn changes_when_position_changes() {
        let universe = sample_universe();
        let mut p = Portfolio::new();
        p.positions
            .insert("sec-aapl".into(), Position::new("sec-aapl", dec!(10), dec!(100)));
        let h1 = portfolio_hash(&p, &universe);
        p.positions
            .insert("sec-aapl".into(), Position::new("sec-aapl", dec!(11), dec!(100)));
        let h2 = portfolio_hash(&p, &universe);
        assert_ne!(h1, h2);
    }
}
