//! `history` store: per-symbol daily OHLCV bars and FX rates (§2).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::SentinelError;
use crate::domain::ports::Ohlcv;
use crate::domain::repositories::HistoryRepository;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteHistoryRepository {
    db: Database,
}

impl SqliteHistoryRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        let mut conn = db.pool.acquire().await.map_err(integrity)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bars (
                security_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                PRIMARY KEY (security_id, timestamp)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(integrity)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bars_security_time ON bars (security_id, timestamp)",
        )
        .execute(&mut *conn)
        .await
        .map_err(integrity)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fx_rates (
                base TEXT NOT NULL,
                quote TEXT NOT NULL,
                as_of INTEGER NOT NULL,
                rate TEXT NOT NULL,
                PRIMARY KEY (base, quote, as_of)
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
        store: "history".into(),
        reason: e.to_string(),
    }
}

fn integrity_reason(reason: String) -> SentinelError {
    SentinelError::Integrity {
        store: "history".into(),
        reason,
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
struct BarRow {
    timestamp: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl BarRow {
    fn into_domain(self) -> Result<Ohlcv, SentinelError> {
        Ok(Ohlcv {
            timestamp: epoch(self.timestamp)?,
            open: decimal(&self.open)?,
            high: decimal(&self.high)?,
            low: decimal(&self.low)?,
            close: decimal(&self.close)?,
            volume: decimal(&self.volume)?,
        })
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn append_bar(&self, security_id: &str, bar: &Ohlcv) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            INSERT INTO bars (security_id, timestamp, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT(security_id, timestamp) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume
            "#,
        )
        .bind(security_id)
        .bind(bar.timestamp.timestamp())
        .bind(bar.open.to_string())
        .bind(bar.high.to_string())
        .bind(bar.low.to_string())
        .bind(bar.close.to_string())
        .bind(bar.volume.to_string())
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }

    async fn bars(
        &self,
        security_id: &str,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<Ohlcv>, SentinelError> {
        let rows = sqlx::query_as::<_, BarRow>(
            r#"
            SELECT timestamp, open, high, low, close, volume FROM bars
            WHERE security_id = $1 AND timestamp >= $2 AND timestamp <= $3
            ORDER BY timestamp ASC
            "#,
        )
        .bind(security_id)
        .bind(range.0.timestamp())
        .bind(range.1.timestamp())
        .fetch_all(&self.db.pool)
        .await
        .map_err(integrity)?;

        rows.into_iter().map(BarRow::into_domain).collect()
    }

    async fn fx_rate(
        &self,
        base: &str,
        quote: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Decimal>, SentinelError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT rate FROM fx_rates
            WHERE base = $1 AND quote = $2 AND as_of <= $3
            ORDER BY as_of DESC LIMIT 1
            "#,
        )
        .bind(base)
        .bind(quote)
        .bind(as_of.timestamp())
        .fetch_optional(&self.db.pool)
        .await
        .map_err(integrity)?;

        row.map(|(r,)| decimal(&r)).transpose()
    }

    async fn set_fx_rate(
        &self,
        base: &str,
        quote: &str,
        as_of: DateTime<Utc>,
        rate: Decimal,
    ) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            INSERT INTO fx_rates (base, quote, as_of, rate) VALUES ($1, $2, $3, $4)
            ON CONFLICT(base, quote, as_of) DO UPDATE SET rate = excluded.rate
            "#,
        )
        .bind(base)
        .bind(quote)
        .bind(as_of.timestamp())
        .bind(rate.to_string())
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

    async fn repo() -> SqliteHistoryRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqliteHistoryRepository::new(db).await.unwrap()
    }

    fn bar(ts: DateTime<Utc>) -> Ohlcv {
        Ohlcv {
            timestamp: ts,
            open: dec!(100),
            high: dec!(105),
            low: dec!(99),
            close: dec!(103),
            volume: dec!(1_000_000),
        }
    }

    #[tokio::test]
    async fn append_then_range_query() {
        let repo = repo().await;
        let now = Utc::now();
        repo.append_bar("AAPL", &bar(now)).await.unwrap();
        let bars = repo
            .bars("AAPL", (now - chrono::Duration::days(1), now + chrono::Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[tokio::test]
    async fn fx_rate_picks_most_recent_on_or_before() {
        let repo = repo().await;
        let t0 = Utc::now() - chrono::Duration::days(2);
        let t1 = Utc::now() - chrono::Duration::days(1);
        repo.set_fx_rate("EUR", "USD", t0, dec!(1.05)).await.unwrap();
        repo.set_fx_rate("EUR", "USD", t1, dec!(1.08)).await.unwrap();
        let rate = repo.fx_rate("EUR", "USD", Utc::now()).await.unwrap();
        assert_eq!(rate, Some(dec!(1.08)));
    }

    #[tokio::test]
    async fn fx_rate_missing_pair_returns_none() {
        let repo = repo().await;
        assert!(repo.fx_rate("EUR", "JPY", Utc::now()).await.unwrap().is_none());
    }
}
