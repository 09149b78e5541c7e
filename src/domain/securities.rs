//! Tradable securities, including cash-as-security synthetic entries.

use serde::{Deserialize, Serialize};

/// Prefix used for synthetic cash positions: `CASH:EUR`, `CASH:USD`, ...
pub const CASH_SYMBOL_PREFIX: &str = "CASH:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Security {
    pub security_id: String,
    pub symbol: String,
    pub isin: Option<String>,
    pub currency: String,
    pub country: Option<String>,
    pub industry: Option<String>,
    pub min_lot: rust_decimal::Decimal,
    pub allow_buy: bool,
    pub allow_sell: bool,
    pub active: bool,
}

impl Security {
    pub fn cash(currency: &str) -> Self {
        Self {
            security_id: format!("{CASH_SYMBOL_PREFIX}{currency}"),
            symbol: format!("{CASH_SYMBOL_PREFIX}{currency}"),
            isin: None,
            currency: currency.to_string(),
            country: None,
            industry: None,
            min_lot: rust_decimal::Decimal::ZERO,
            allow_buy: false,
            allow_sell: false,
            active: true,
        }
    }

    pub fn is_cash(&self) -> bool {
        self.symbol.starts_with(CASH_SYMBOL_PREFIX)
    }

    /// Country/industry group used by the optimizer and the opportunity
    /// identifier; securities with no country recorded are binned as
    /// `OTHER` (§4.4.2) rather than dropped.
    pub fn country_group(&self) -> &str {
        self.country.as_deref().unwrap_or("OTHER")
    }

    pub fn industry_group(&self) -> &str {
        self.industry.as_deref().unwrap_or("OTHER")
    }

    pub fn cash_currency(&self) -> Option<&str> {
        self.symbol
            .strip_prefix(CASH_SYMBOL_PREFIX)
            .map(|ccy| ccy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cash_security_roundtrip() {
        let c = Security::cash("EUR");
        assert!(c.is_cash());
        assert_eq!(c.cash_currency(), Some("EUR"));
    }

    #[test]
    fn missing_country_bins_as_other() {
        let s = Security {
            security_id: "1".into(),
            symbol: "XYZ".into(),
            isin: None,
            currency: "USD".into(),
            country: None,
            industry: None,
            min_lot: rust_decimal::Decimal::ONE,
            allow_buy: true,
            allow_sell: true,
            active: true,
        };
        assert_eq!(s.country_group(), "OTHER");
        assert_eq!(s.industry_group(), "OTHER");
    }
}
