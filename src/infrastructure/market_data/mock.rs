//! In-memory `MarketDataClient` used for research mode and tests (§6.3).
//! Seeded quotes/fundamentals/bars rather than a live Yahoo-equivalent feed,
//! the same role `MockMarketDataService` (`infrastructure/mock.rs`) plays
//! in the reference architecture.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::domain::errors::SentinelError;
use crate::domain::ports::{AnalystView, Fundamentals, MarketDataClient, Ohlcv, Quote};

#[derive(Default)]
struct SeedState {
    prices: HashMap<String, Decimal>,
    bars: HashMap<String, Vec<Ohlcv>>,
    fundamentals: HashMap<String, Fundamentals>,
    analyst: HashMap<String, AnalystView>,
    isin_to_id: HashMap<String, String>,
}

pub struct MockMarketDataClient {
    state: Arc<RwLock<SeedState>>,
}

impl MockMarketDataClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SeedState::default())),
        }
    }

    pub async fn seed_price(&self, security_id: &str, price: Decimal) {
        self.state.write().await.prices.insert(security_id.to_string(), price);
    }

    pub async fn seed_bars(&self, security_id: &str, bars: Vec<Ohlcv>) {
        self.state.write().await.bars.insert(security_id.to_string(), bars);
    }

    pub async fn seed_fundamentals(&self, security_id: &str, fundamentals: Fundamentals) {
        self.state
            .write()
            .await
            .fundamentals
            .insert(security_id.to_string(), fundamentals);
    }

    pub async fn seed_analyst(&self, security_id: &str, view: AnalystView) {
        self.state.write().await.analyst.insert(security_id.to_string(), view);
    }

    pub async fn seed_isin(&self, isin: &str, security_id: &str) {
        self.state
            .write()
            .await
            .isin_to_id
            .insert(isin.to_string(), security_id.to_string());
    }
}

impl Default for MockMarketDataClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataClient for MockMarketDataClient {
    async fn get_quote(&self, security_ids: &[String]) -> Result<Vec<Quote>, SentinelError> {
        let state = self.state.read().await;
        let now = Utc::now();
        security_ids
            .iter()
            .map(|id| {
                let price = state
                    .prices
                    .get(id)
                    .copied()
                    .ok_or_else(|| SentinelError::NotFound(format!("no mock quote for {id}")))?;
                Ok(Quote {
                    security_id: id.clone(),
                    price,
                    as_of: now,
                })
            })
            .collect()
    }

    async fn get_ohlcv(
        &self,
        security_id: &str,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<Ohlcv>, SentinelError> {
        let state = self.state.read().await;
        let bars = state.bars.get(security_id).cloned().unwrap_or_default();
        Ok(bars
            .into_iter()
            .filter(|b| b.timestamp >= range.0 && b.timestamp <= range.1)
            .collect())
    }

    async fn get_fundamentals(&self, security_id: &str) -> Result<Fundamentals, SentinelError> {
        self.state
            .read()
            .await
            .fundamentals
            .get(security_id)
            .cloned()
            .ok_or_else(|| SentinelError::NotFound(format!("no mock fundamentals for {security_id}")))
    }

    async fn get_analyst(&self, security_id: &str) -> Result<AnalystView, SentinelError> {
        self.state
            .read()
            .await
            .analyst
            .get(security_id)
            .cloned()
            .ok_or_else(|| SentinelError::NotFound(format!("no mock analyst view for {security_id}")))
    }

    async fn lookup_by_isin(&self, isin: &str) -> Result<Option<String>, SentinelError> {
        Ok(self.state.read().await.isin_to_id.get(isin).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn get_quote_returns_seeded_price() {
        let client = MockMarketDataClient::new();
        client.seed_price("AAPL", dec!(150)).await;
        let quotes = client.get_quote(&["AAPL".to_string()]).await.unwrap();
        assert_eq!(quotes[0].price, dec!(150));
    }

    #[tokio::test]
    async fn get_quote_missing_security_errors() {
        let client = MockMarketDataClient::new();
        let err = client.get_quote(&["MISSING".to_string()]).await.unwrap_err();
        assert!(matches!(err, SentinelError::NotFound(_)));
    }

    #[tokio::test]
    async fn lookup_by_isin_returns_seeded_mapping() {
        let client = MockMarketDataClient::new();
        client.seed_isin("US0000000000", "1").await;
        assert_eq!(
            client.lookup_by_isin("US0000000000").await.unwrap(),
            Some("1".to_string())
        );
        assert_eq!(client.lookup_by_isin("UNKNOWN").await.unwrap(), None);
    }
}
