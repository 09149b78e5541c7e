//! `portfolio` store: `positions`, `scores`, and `equity_snapshots` tables (§3).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::SentinelError;
use crate::domain::repositories::PortfolioRepository;
use crate::domain::trading::Position;
use crate::infrastructure::persistence::database::Database;

pub struct SqlitePortfolioRepository {
    db: Database,
}

impl SqlitePortfolioRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        let mut conn = db.pool.acquire().await.map_err(integrity)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                security_id TEXT PRIMARY KEY,
                quantity TEXT NOT NULL,
                avg_cost TEXT NOT NULL,
                market_value TEXT NOT NULL,
                as_of INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(integrity)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scores (
                security_id TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                as_of_date TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (security_id, metric_name, as_of_date)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(integrity)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS equity_snapshots (
                as_of INTEGER PRIMARY KEY,
                total_equity TEXT NOT NULL
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
        store: "portfolio".into(),
        reason: e.to_string(),
    }
}

fn integrity_reason(reason: String) -> SentinelError {
    SentinelError::Integrity {
        store: "portfolio".into(),
        reason,
    }
}

fn decimal(s: &str) -> Result<Decimal, SentinelError> {
    Decimal::from_str(s).map_err(|e| integrity_reason(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    security_id: String,
    quantity: String,
    avg_cost: String,
    market_value: String,
    as_of: i64,
}

impl PositionRow {
    fn into_domain(self) -> Result<Position, SentinelError> {
        Ok(Position {
            security_id: self.security_id,
            quantity: decimal(&self.quantity)?,
            avg_cost: decimal(&self.avg_cost)?,
            market_value: decimal(&self.market_value)?,
            as_of: Utc
                .timestamp_opt(self.as_of, 0)
                .single()
                .ok_or_else(|| integrity_reason(format!("invalid timestamp {}", self.as_of)))?,
        })
    }
}

#[async_trait]
impl PortfolioRepository for SqlitePortfolioRepository {
    async fn positions(&self) -> Result<Vec<Position>, SentinelError> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT security_id, quantity, avg_cost, market_value, as_of FROM positions",
        )
        .fetch_all(&self.db.pool)
        .await
        .map_err(integrity)?;

        rows.into_iter().map(PositionRow::into_domain).collect()
    }

    async fn upsert_position(&self, position: &Position) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            INSERT INTO positions (security_id, quantity, avg_cost, market_value, as_of)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(security_id) DO UPDATE SET
                quantity = excluded.quantity,
                avg_cost = excluded.avg_cost,
                market_value = excluded.market_value,
                as_of = excluded.as_of
            "#,
        )
        .bind(&position.security_id)
        .bind(position.quantity.to_string())
        .bind(position.avg_cost.to_string())
        .bind(position.market_value.to_string())
        .bind(position.as_of.timestamp())
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }

    async fn get_metric(
        &self,
        security_id: &str,
        metric_name: &str,
        as_of: NaiveDate,
    ) -> Result<Option<Decimal>, SentinelError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM scores WHERE security_id = $1 AND metric_name = $2 AND as_of_date = $3",
        )
        .bind(security_id)
        .bind(metric_name)
        .bind(as_of.to_string())
        .fetch_optional(&self.db.pool)
        .await
        .map_err(integrity)?;

        row.map(|(v,)| decimal(&v)).transpose()
    }

    async fn set_metric(
        &self,
        security_id: &str,
        metric_name: &str,
        as_of: NaiveDate,
        value: Decimal,
    ) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            INSERT INTO scores (security_id, metric_name, as_of_date, value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(security_id, metric_name, as_of_date) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(security_id)
        .bind(metric_name)
        .bind(as_of.to_string())
        .bind(value.to_string())
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }

    async fn snapshot(&self, as_of: DateTime<Utc>, total_equity: Decimal) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            INSERT INTO equity_snapshots (as_of, total_equity) VALUES ($1, $2)
            ON CONFLICT(as_of) DO UPDATE SET total_equity = excluded.total_equity
            "#,
        )
        .bind(as_of.timestamp())
        .bind(total_equity.to_string())
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn repo() -> SqlitePortfolioRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqlitePortfolioRepository::new(db).await.unwrap()
    }

    #[tokio::test]
    async fn upsert_position_then_list() {
        let repo = repo().await;
        repo.upsert_position(&Position::new("AAPL", dec!(10), dec!(150)))
            .await
            .unwrap();
        let positions = repo.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].security_id, "AAPL");
    }

    #[tokio::test]
    async fn metric_roundtrips_by_date() {
        let repo = repo().await;
        let today = Utc::now().date_naive();
        repo.set_metric("AAPL", "momentum", today, dec!(0.42))
            .await
            .unwrap();
        let got = repo.get_metric("AAPL", "momentum", today).await.unwrap();
        assert_eq!(got, Some(dec!(0.42)));
    }

    #[tokio::test]
    async fn snapshot_upserts_by_timestamp() {
        let repo = repo().await;
        let ts = Utc::now();
        repo.snapshot(ts, dec!(100000)).await.unwrap();
        repo.snapshot(ts, dec!(101000)).await.unwrap();
        let row: (String,) = sqlx::query_as("SELECT total_equity FROM equity_snapshots")
            .fetch_one(&repo.db.pool)
            .await
            .unwrap();
        assert_eq!(row.0, "101000");
    }
}
