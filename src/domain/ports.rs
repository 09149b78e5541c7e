use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::SentinelError;
use crate::domain::trading::{CashFlow, OrderSide, Position, Trade};

#[derive(Debug, Clone)]
pub struct CashBalance {
    pub currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Filled,
    PartiallyFilled,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct OrderState {
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub avg_price: Option<Decimal>,
    pub fee: Decimal,
}

#[derive(Debug, Clone)]
pub struct BrokerHealth {
    pub ok: bool,
    pub latency_ms: u64,
}

/// Broker boundary (§6.3). Consumed, never implemented against a real
/// vendor SDK -- `infrastructure::broker::MockBrokerClient` plays the role
/// the reference architecture's `infrastructure/mock.rs` plays there.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn get_portfolio(&self) -> Result<Vec<Position>, SentinelError>;
    async fn get_cash_balances(&self) -> Result<Vec<CashBalance>, SentinelError>;
    async fn place_order(
        &self,
        security_id: &str,
        side: OrderSide,
        quantity: Decimal,
        order_type: OrderType,
        limit_price: Option<Decimal>,
    ) -> Result<String, SentinelError>;
    async fn get_order(&self, order_id: &str) -> Result<OrderState, SentinelError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), SentinelError>;
    async fn get_trade_history(&self, since: DateTime<Utc>) -> Result<Vec<Trade>, SentinelError>;
    async fn get_cash_flows(&self, since: DateTime<Utc>) -> Result<Vec<CashFlow>, SentinelError>;
    async fn health(&self) -> Result<BrokerHealth, SentinelError>;
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub security_id: String,
    pub price: Decimal,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Ohlcv {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone)]
pub struct Fundamentals {
    pub security_id: String,
    pub pe_ratio: Option<Decimal>,
    pub debt_to_equity: Option<Decimal>,
    pub quality_score: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct AnalystView {
    pub security_id: String,
    pub rating: Option<Decimal>,
    pub price_target: Option<Decimal>,
}

/// Market-data boundary (§6.3). All results pass through the `client_data`
/// cache with per-domain TTLs before reaching the planning pipeline --
/// implementations here just fetch, the cache layer owns freshness policy.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn get_quote(&self, security_ids: &[String]) -> Result<Vec<Quote>, SentinelError>;
    async fn get_ohlcv(
        &self,
        security_id: &str,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<Ohlcv>, SentinelError>;
    async fn get_fundamentals(&self, security_id: &str) -> Result<Fundamentals, SentinelError>;
    async fn get_analyst(&self, security_id: &str) -> Result<AnalystView, SentinelError>;
    async fn lookup_by_isin(&self, isin: &str) -> Result<Option<String>, SentinelError>;
}
