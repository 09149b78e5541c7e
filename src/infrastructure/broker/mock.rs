//! In-memory `BrokerClient` used for research mode and tests (§6.3), playing
//! the role the reference architecture's `MockExecutionService`
//! (`infrastructure/mock.rs`) plays there: fills every order immediately at
//! a caller-seeded price, tracks positions/cash/trade history the same way
//! a real venue would, with no network calls anywhere in the path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use crate::domain::errors::SentinelError;
use crate::domain::ports::{
    BrokerClient, BrokerHealth, CashBalance, OrderState, OrderStatus, OrderType,
};
use crate::domain::trading::{CashFlow, OrderSide, Position, Trade};

struct MockState {
    positions: HashMap<String, Position>,
    cash: HashMap<String, Decimal>,
    orders: HashMap<String, OrderState>,
    trades: Vec<Trade>,
    cash_flows: Vec<CashFlow>,
}

/// Fill price per security, seeded by the caller so tests get deterministic
/// scenarios (drift, gaps, halts) without a real market-data feed.
pub struct MockBrokerClient {
    state: Arc<RwLock<MockState>>,
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
    fee_fixed: Decimal,
    fee_percent: Decimal,
    order_seq: AtomicU64,
    healthy: std::sync::atomic::AtomicBool,
}

impl MockBrokerClient {
    pub fn new(starting_cash: Decimal, currency: &str) -> Self {
        let mut cash = HashMap::new();
        cash.insert(currency.to_string(), starting_cash);

        Self {
            state: Arc::new(RwLock::new(MockState {
                positions: HashMap::new(),
                cash,
                orders: HashMap::new(),
                trades: Vec::new(),
                cash_flows: Vec::new(),
            })),
            prices: Arc::new(RwLock::new(HashMap::new())),
            fee_fixed: dec!(1.00),
            fee_percent: dec!(0.001),
            order_seq: AtomicU64::new(1),
            healthy: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub async fn set_price(&self, security_id: &str, price: Decimal) {
        self.prices.write().await.insert(security_id.to_string(), price);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    async fn price_of(&self, security_id: &str) -> Result<Decimal, SentinelError> {
        self.prices
            .read()
            .await
            .get(security_id)
            .copied()
            .ok_or_else(|| SentinelError::NotFound(format!("no mock price set for {security_id}")))
    }

    fn fee_for(&self, notional: Decimal) -> Decimal {
        self.fee_fixed + notional * self.fee_percent
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn get_portfolio(&self) -> Result<Vec<Position>, SentinelError> {
        Ok(self.state.read().await.positions.values().cloned().collect())
    }

    async fn get_cash_balances(&self) -> Result<Vec<CashBalance>, SentinelError> {
        Ok(self
            .state
            .read()
            .await
            .cash
            .iter()
            .map(|(currency, amount)| CashBalance {
                currency: currency.clone(),
                amount: *amount,
            })
            .collect())
    }

    async fn place_order(
        &self,
        security_id: &str,
        side: OrderSide,
        quantity: Decimal,
        _order_type: OrderType,
        limit_price: Option<Decimal>,
    ) -> Result<String, SentinelError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(SentinelError::TransientNetwork("mock broker unavailable".into()));
        }

        let price = match limit_price {
            Some(p) => p,
            None => self.price_of(security_id).await?,
        };
        let notional = quantity * price;
        let fee = self.fee_for(notional);

        let order_id = format!("mock-{}", self.order_seq.fetch_add(1, Ordering::SeqCst));
        let trade_id = uuid::Uuid::new_v4().to_string();

        let mut state = self.state.write().await;

        let cash_delta = match side {
            OrderSide::Buy => -(notional + fee),
            OrderSide::Sell => notional - fee,
        };

        let position = state
            .positions
            .entry(security_id.to_string())
            .or_insert_with(|| Position::new(security_id, Decimal::ZERO, price));

        match side {
            OrderSide::Buy => {
                let new_qty = position.quantity + quantity;
                if new_qty != Decimal::ZERO {
                    position.avg_cost = (position.avg_cost * position.quantity + price * quantity) / new_qty;
                }
                position.quantity = new_qty;
            }
            OrderSide::Sell => {
                position.quantity -= quantity;
            }
        }
        position.market_value = position.quantity * price;
        position.as_of = Utc::now();

        let usd_cash = state.cash.entry("USD".to_string()).or_insert(Decimal::ZERO);
        *usd_cash += cash_delta;

        state.trades.push(Trade {
            trade_id,
            security_id: security_id.to_string(),
            side,
            quantity,
            price,
            fee,
            currency: "USD".to_string(),
            executed_at: Utc::now(),
            broker_order_id: order_id.clone(),
        });

        state.orders.insert(
            order_id.clone(),
            OrderState {
                status: OrderStatus::Filled,
                filled_quantity: quantity,
                avg_price: Some(price),
                fee,
            },
        );

        Ok(order_id)
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderState, SentinelError> {
        self.state
            .read()
            .await
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| SentinelError::NotFound(format!("unknown order {order_id}")))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), SentinelError> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| SentinelError::NotFound(format!("unknown order {order_id}")))?;

        if order.status == OrderStatus::Filled {
            return Err(SentinelError::Conflict("order already filled".into()));
        }
        order.status = OrderStatus::Cancelled;
        Ok(())
    }

    async fn get_trade_history(&self, since: DateTime<Utc>) -> Result<Vec<Trade>, SentinelError> {
        Ok(self
            .state
            .read()
            .await
            .trades
            .iter()
            .filter(|t| t.executed_at >= since)
            .cloned()
            .collect())
    }

    async fn get_cash_flows(&self, since: DateTime<Utc>) -> Result<Vec<CashFlow>, SentinelError> {
        Ok(self
            .state
            .read()
            .await
            .cash_flows
            .iter()
            .filter(|c| c.posted_at >= since)
            .cloned()
            .collect())
    }

    async fn health(&self) -> Result<BrokerHealth, SentinelError> {
        Ok(BrokerHealth {
            ok: self.healthy.load(Ordering::SeqCst),
            latency_ms: 5,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buy_order_fills_and_moves_cash() {
        let broker = MockBrokerClient::new(dec!(10_000), "USD");
        broker.set_price("AAPL", dec!(150)).await;

        let order_id = broker
            .place_order("AAPL", OrderSide::Buy, dec!(10), OrderType::Market, None)
            .await
            .unwrap();

        let state = broker.get_order(&order_id).await.unwrap();
        assert_eq!(state.status, OrderStatus::Filled);

        let positions = broker.get_portfolio().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, dec!(10));

        let cash = broker.get_cash_balances().await.unwrap();
        let usd = cash.iter().find(|c| c.currency == "USD").unwrap();
        assert!(usd.amount < dec!(10_000));
    }

    #[tokio::test]
    async fn sell_without_price_fails() {
        let broker = MockBrokerClient::new(dec!(10_000), "USD");
        let err = broker
            .place_order("AAPL", OrderSide::Sell, dec!(1), OrderType::Market, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SentinelError::NotFound(_)));
    }

    #[tokio::test]
    async fn unhealthy_broker_rejects_orders() {
        let broker = MockBrokerClient::new(dec!(10_000), "USD");
        broker.set_price("AAPL", dec!(150)).await;
        broker.set_healthy(false);

        let err = broker
            .place_order("AAPL", OrderSide::Buy, dec!(1), OrderType::Market, None)
            .await
            .unwrap_err();
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn cancel_filled_order_is_rejected() {
        let broker = MockBrokerClient::new(dec!(10_000), "USD");
        broker.set_price("AAPL", dec!(150)).await;
        let order_id = broker
            .place_order("AAPL", OrderSide::Buy, dec!(1), OrderType::Market, None)
            .await
            .unwrap();
        let err = broker.cancel_order(&order_id).await.unwrap_err();
        assert!(matches!(err, SentinelError::Conflict(_)));
    }
}
