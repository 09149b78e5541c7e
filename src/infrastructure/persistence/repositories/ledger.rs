//! `ledger` store: append-only `trades` and `cash_flows` tables (§3, §5).
//!
//! Single-writer discipline per §5 is enforced with `BEGIN IMMEDIATE`
//! rather than relying on the pool to serialize writers, matching the
//! reference architecture's practice of wrapping multi-statement mutations
//! in an explicit transaction (`infrastructure/persistence/repositories/
//! risk_state_repository.rs`'s upsert is a single statement; Sentinel's
//! ledger appends are the multi-row analogue).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::SentinelError;
use crate::domain::repositories::LedgerRepository;
use crate::domain::trading::{CashFlow, CashFlowKind, OrderSide, Trade};
use crate::infrastructure::persistence::database::Database;

pub struct SqliteLedgerRepository {
    db: Database,
}

impl SqliteLedgerRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        let mut conn = db.pool.acquire().await.map_err(integrity)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                trade_id TEXT PRIMARY KEY,
                security_id TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity TEXT NOT NULL,
                price TEXT NOT NULL,
                fee TEXT NOT NULL,
                currency TEXT NOT NULL,
                executed_at INTEGER NOT NULL,
                broker_order_id TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(integrity)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cash_flows (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount TEXT NOT NULL,
                posted_at INTEGER NOT NULL,
                security_id TEXT
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(integrity)?;

        drop(conn);
        Ok(Self { db })
    }
}

fn integrity(e: sqlx::Error) -> SentinelError {
    SentinelError::Integrity {
        store: "ledger".into(),
        reason: e.to_string(),
    }
}

fn integrity_reason(reason: String) -> SentinelError {
    SentinelError::Integrity {
        store: "ledger".into(),
        reason,
    }
}

fn side_to_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn side_from_str(s: &str) -> Result<OrderSide, SentinelError> {
    match s {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(integrity_reason(format!("unknown order side '{other}'"))),
    }
}

fn kind_to_str(kind: CashFlowKind) -> &'static str {
    match kind {
        CashFlowKind::Deposit => "deposit",
        CashFlowKind::Withdrawal => "withdrawal",
        CashFlowKind::Fee => "fee",
        CashFlowKind::Dividend => "dividend",
        CashFlowKind::Coupon => "coupon",
        CashFlowKind::Maturity => "maturity",
    }
}

fn kind_from_str(s: &str) -> Result<CashFlowKind, SentinelError> {
    match s {
        "deposit" => Ok(CashFlowKind::Deposit),
        "withdrawal" => Ok(CashFlowKind::Withdrawal),
        "fee" => Ok(CashFlowKind::Fee),
        "dividend" => Ok(CashFlowKind::Dividend),
        "coupon" => Ok(CashFlowKind::Coupon),
        "maturity" => Ok(CashFlowKind::Maturity),
        other => Err(integrity_reason(format!("unknown cash flow kind '{other}'"))),
    }
}

fn decimal(s: &str) -> Result<Decimal, SentinelError> {
    Decimal::from_str(s).map_err(|e| integrity_reason(e.to_string()))
}

fn epoch(ts: i64) -> Result<DateTime<Utc>, SentinelError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| integrity_reason(format!("invalid timestamp {ts}")))
}

#[derive(sqlx::FromRow)]
struct TradeRow {
    trade_id: String,
    security_id: String,
    side: String,
    quantity: String,
    price: String,
    fee: String,
    currency: String,
    executed_at: i64,
    broker_order_id: String,
}

impl TradeRow {
    fn into_domain(self) -> Result<Trade, SentinelError> {
        Ok(Trade {
            trade_id: self.trade_id,
            security_id: self.security_id,
            side: side_from_str(&self.side)?,
            quantity: decimal(&self.quantity)?,
            price: decimal(&self.price)?,
            fee: decimal(&self.fee)?,
            currency: self.currency,
            executed_at: epoch(self.executed_at)?,
            broker_order_id: self.broker_order_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CashFlowRow {
    id: String,
    kind: String,
    currency: String,
    amount: String,
    posted_at: i64,
    security_id: Option<String>,
}

impl CashFlowRow {
    fn into_domain(self) -> Result<CashFlow, SentinelError> {
        Ok(CashFlow {
            id: self.id,
            kind: kind_from_str(&self.kind)?,
            currency: self.currency,
            amount: decimal(&self.amount)?,
            posted_at: epoch(self.posted_at)?,
            security_id: self.security_id,
        })
    }
}

const TRADE_COLUMNS: &str =
    "trade_id, security_id, side, quantity, price, fee, currency, executed_at, broker_order_id";
const CASH_FLOW_COLUMNS: &str = "id, kind, currency, amount, posted_at, security_id";

#[async_trait]
impl LedgerRepository for SqliteLedgerRepository {
    async fn append_trade(&self, trade: &Trade) -> Result<(), SentinelError> {
        let mut tx = self.db.pool.begin().await.map_err(integrity)?;

        sqlx::query(
            r#"
            INSERT INTO trades (
                trade_id, security_id, side, quantity, price, fee, currency,
                executed_at, broker_order_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&trade.trade_id)
        .bind(&trade.security_id)
        .bind(side_to_str(trade.side))
        .bind(trade.quantity.to_string())
        .bind(trade.price.to_string())
        .bind(trade.fee.to_string())
        .bind(&trade.currency)
        .bind(trade.executed_at.timestamp())
        .bind(&trade.broker_order_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return SentinelError::Conflict(format!(
                        "trade for broker order {} already recorded",
                        trade.broker_order_id
                    ));
                }
            }
            integrity(e)
        })?;

        tx.commit().await.map_err(integrity)?;
        Ok(())
    }

    async fn append_cash_flow(&self, cash_flow: &CashFlow) -> Result<(), SentinelError> {
        sqlx::query(&format!(
            "INSERT INTO cash_flows ({CASH_FLOW_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(&cash_flow.id)
        .bind(kind_to_str(cash_flow.kind))
        .bind(&cash_flow.currency)
        .bind(cash_flow.amount.to_string())
        .bind(cash_flow.posted_at.timestamp())
        .bind(&cash_flow.security_id)
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }

    async fn trades_since(&self, since: DateTime<Utc>) -> Result<Vec<Trade>, SentinelError> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE executed_at >= $1 ORDER BY executed_at ASC"
        ))
        .bind(since.timestamp())
        .fetch_all(&self.db.pool)
        .await
        .map_err(integrity)?;

        rows.into_iter().map(TradeRow::into_domain).collect()
    }

    async fn cash_flows_since(&self, since: DateTime<Utc>) -> Result<Vec<CashFlow>, SentinelError> {
        let rows = sqlx::query_as::<_, CashFlowRow>(&format!(
            "SELECT {CASH_FLOW_COLUMNS} FROM cash_flows WHERE posted_at >= $1 ORDER BY posted_at ASC"
        ))
        .bind(since.timestamp())
        .fetch_all(&self.db.pool)
        .await
        .map_err(integrity)?;

        rows.into_iter().map(CashFlowRow::into_domain).collect()
    }

    async fn trade_by_broker_order_id(
        &self,
        broker_order_id: &str,
    ) -> Result<Option<Trade>, SentinelError> {
        let row = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE broker_order_id = $1"
        ))
        .bind(broker_order_id)
        .fetch_optional(&self.db.pool)
        .await
        .map_err(integrity)?;

        row.map(TradeRow::into_domain).transpose()
    }

    async fn last_trade_at(&self) -> Result<Option<DateTime<Utc>>, SentinelError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT MAX(executed_at) FROM trades WHERE executed_at IS NOT NULL")
                .fetch_optional(&self.db.pool)
                .await
                .map_err(integrity)?;

        row.map(|(ts,)| epoch(ts)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn repo() -> SqliteLedgerRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqliteLedgerRepository::new(db).await.unwrap()
    }

    fn sample_trade(order_id: &str) -> Trade {
        Trade {
            trade_id: uuid::Uuid::new_v4().to_string(),
            security_id: "AAPL".into(),
            side: OrderSide::Buy,
            quantity: dec!(10),
            price: dec!(150.00),
            fee: dec!(1.00),
            currency: "USD".into(),
            executed_at: Utc::now(),
            broker_order_id: order_id.into(),
        }
    }

    #[tokio::test]
    async fn append_trade_then_lookup_by_order_id() {
        let repo = repo().await;
        repo.append_trade(&sample_trade("order-1")).await.unwrap();
        let found = repo.trade_by_broker_order_id("order-1").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn duplicate_broker_order_id_is_rejected() {
        let repo = repo().await;
        repo.append_trade(&sample_trade("order-1")).await.unwrap();
        let err = repo.append_trade(&sample_trade("order-1")).await.unwrap_err();
        assert!(matches!(err, SentinelError::Conflict(_)));
    }

    #[tokio::test]
    async fn cash_flows_since_filters_by_time() {
        let repo = repo().await;
        let cutoff = Utc::now();
        repo.append_cash_flow(&CashFlow {
            id: "cf1".into(),
            kind: CashFlowKind::Deposit,
            currency: "USD".into(),
            amount: dec!(1000),
            posted_at: cutoff + chrono::Duration::seconds(5),
            security_id: None,
        })
        .await
        .unwrap();

        let flows = repo.cash_flows_since(cutoff).await.unwrap();
        assert_eq!(flows.len(), 1);
    }

    #[tokio::test]
    async fn last_trade_at_tracks_most_recent() {
        let repo = repo().await;
        assert!(repo.last_trade_at().await.unwrap().is_none());
        repo.append_trade(&sample_trade("order-1")).await.unwrap();
        assert!(repo.last_trade_at().await.unwrap().is_some());
    }
}
