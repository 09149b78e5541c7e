//! `universe` store: `securities` table (§3).

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::SentinelError;
use crate::domain::repositories::SecurityRepository;
use crate::domain::securities::Security;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteSecurityRepository {
    db: Database,
}

impl SqliteSecurityRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS securities (
                security_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL UNIQUE,
                isin TEXT,
                currency TEXT NOT NULL,
                country TEXT,
                industry TEXT,
                min_lot TEXT NOT NULL,
                allow_buy BOOLEAN NOT NULL,
                allow_sell BOOLEAN NOT NULL,
                active BOOLEAN NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
        )
        .execute(&db.pool)
        .await
        .map_err(integrity)?;

        Ok(Self { db })
    }

    fn from_row(row: SecurityRow) -> Result<Security, SentinelError> {
        Ok(Security {
            security_id: row.security_id,
            symbol: row.symbol,
            isin: row.isin,
            currency: row.currency,
            country: row.country,
            industry: row.industry,
            min_lot: Decimal::from_str(&row.min_lot).map_err(|e| integrity_reason(e.to_string()))?,
            allow_buy: row.allow_buy,
            allow_sell: row.allow_sell,
            active: row.active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SecurityRow {
    security_id: String,
    symbol: String,
    isin: Option<String>,
    currency: String,
    country: Option<String>,
    industry: Option<String>,
    min_lot: String,
    allow_buy: bool,
    allow_sell: bool,
    active: bool,
}

fn integrity(e: sqlx::Error) -> SentinelError {
    SentinelError::Integrity {
        store: "universe".into(),
        reason: e.to_string(),
    }
}

fn integrity_reason(reason: String) -> SentinelError {
    SentinelError::Integrity {
        store: "universe".into(),
        reason,
    }
}

#[async_trait]
impl SecurityRepository for SqliteSecurityRepository {
    async fn upsert(&self, security: &Security) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            INSERT INTO securities (
                security_id, symbol, isin, currency, country, industry,
                min_lot, allow_buy, allow_sell, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT(security_id) DO UPDATE SET
                symbol = excluded.symbol,
                isin = excluded.isin,
                currency = excluded.currency,
                country = excluded.country,
                industry = excluded.industry,
                min_lot = excluded.min_lot,
                allow_buy = excluded.allow_buy,
                allow_sell = excluded.allow_sell,
                active = excluded.active
            "#,
        )
        .bind(&security.security_id)
        .bind(&security.symbol)
        .bind(&security.isin)
        .bind(&security.currency)
        .bind(&security.country)
        .bind(&security.industry)
        .bind(security.min_lot.to_string())
        .bind(security.allow_buy)
        .bind(security.allow_sell)
        .bind(security.active)
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }

    async fn get(&self, security_id: &str) -> Result<Option<Security>, SentinelError> {
        let row = sqlx::query_as::<_, SecurityRow>(
            "SELECT security_id, symbol, isin, currency, country, industry, min_lot, allow_buy, allow_sell, active FROM securities WHERE security_id = $1",
        )
        .bind(security_id)
        .fetch_optional(&self.db.pool)
        .await
        .map_err(integrity)?;

        row.map(Self::from_row).transpose()
    }

    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Security>, SentinelError> {
        let row = sqlx::query_as::<_, SecurityRow>(
            "SELECT security_id, symbol, isin, currency, country, industry, min_lot, allow_buy, allow_sell, active FROM securities WHERE symbol = $1",
        )
        .bind(symbol)
        .fetch_optional(&self.db.pool)
        .await
        .map_err(integrity)?;

        row.map(Self::from_row).transpose()
    }

    async fn active(&self) -> Result<Vec<Security>, SentinelError> {
        let rows = sqlx::query_as::<_, SecurityRow>(
            "SELECT security_id, symbol, isin, currency, country, industry, min_lot, allow_buy, allow_sell, active FROM securities WHERE active = 1",
        )
        .fetch_all(&self.db.pool)
        .await
        .map_err(integrity)?;

        rows.into_iter().map(Self::from_row).collect()
    }

    async fn all(&self) -> Result<Vec<Security>, SentinelError> {
        let rows = sqlx::query_as::<_, SecurityRow>(
            "SELECT security_id, symbol, isin, currency, country, industry, min_lot, allow_buy, allow_sell, active FROM securities",
        )
        .fetch_all(&self.db.pool)
        .await
        .map_err(integrity)?;

        rows.into_iter().map(Self::from_row).collect()
    }

    async fn deactivate(&self, security_id: &str) -> Result<(), SentinelError> {
        sqlx::query("UPDATE securities SET active = 0 WHERE security_id = $1")
            .bind(security_id)
            .execute(&self.db.pool)
            .await
            .map_err(integrity)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteSecurityRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqliteSecurityRepository::new(db).await.unwrap()
    }

    fn sample(id: &str, symbol: &str) -> Security {
        Security {
            security_id: id.into(),
            symbol: symbol.into(),
            isin: Some("US0000000000".into()),
            currency: "USD".into(),
            country: Some("US".into()),
            industry: Some("TECH".into()),
            min_lot: Decimal::ONE,
            allow_buy: true,
            allow_sell: true,
            active: true,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let repo = repo().await;
        repo.upsert(&sample("1", "AAPL")).await.unwrap();
        let got = repo.get("1").await.unwrap().unwrap();
        assert_eq!(got.symbol, "AAPL");
        assert_eq!(got.min_lot, Decimal::ONE);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_conflict() {
        let repo = repo().await;
        repo.upsert(&sample("1", "AAPL")).await.unwrap();
        let mut updated = sample("1", "AAPL");
        updated.allow_buy = false;
        repo.upsert(&updated).await.unwrap();
        let got = repo.get("1").await.unwrap().unwrap();
        assert!(!got.allow_buy);
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deactivate_excludes_from_active() {
        let repo = repo().await;
        repo.upsert(&sample("1", "AAPL")).await.unwrap();
        repo.deactivate("1").await.unwrap();
        assert!(repo.active().await.unwrap().is_empty());
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_by_symbol_finds_security() {
        let repo = repo().await;
        repo.upsert(&sample("1", "AAPL")).await.unwrap();
        let got = repo.get_by_symbol("AAPL").await.unwrap().unwrap();
        assert_eq!(got.security_id, "1");
    }
}
