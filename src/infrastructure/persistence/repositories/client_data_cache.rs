//! `client_data` store: external API response cache with per-domain TTLs (§2).

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::domain::errors::SentinelError;
use crate::domain::repositories::ClientDataCacheRepository;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteClientDataCacheRepository {
    db: Database,
}

impl SqliteClientDataCacheRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS client_data_cache (
                domain TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (domain, key)
            )
            "#,
        )
        .execute(&db.pool)
        .await
        .map_err(integrity)?;

        Ok(Self { db })
    }
}

fn integrity(e: sqlx::Error) -> SentinelError {
    SentinelError::Integrity {
        store: "client_data".into(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl ClientDataCacheRepository for SqliteClientDataCacheRepository {
    async fn get(&self, domain: &str, key: &str) -> Result<Option<String>, SentinelError> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT value, expires_at FROM client_data_cache WHERE domain = $1 AND key = $2",
        )
        .bind(domain)
        .bind(key)
        .fetch_optional(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(row.and_then(|(value, expires_at)| {
            if expires_at >= Utc::now().timestamp() {
                Some(value)
            } else {
                None
            }
        }))
    }

    async fn put(
        &self,
        domain: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), SentinelError> {
        let expires_at = (Utc::now() + ttl).timestamp();

        sqlx::query(
            r#"
            INSERT INTO client_data_cache (domain, key, value, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(domain, key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(domain)
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteClientDataCacheRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqliteClientDataCacheRepository::new(db).await.unwrap()
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let repo = repo().await;
        repo.put("market_data", "quote:AAPL", "150.00", Duration::seconds(60))
            .await
            .unwrap();
        let got = repo.get("market_data", "quote:AAPL").await.unwrap();
        assert_eq!(got.as_deref(), Some("150.00"));
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let repo = repo().await;
        repo.put("market_data", "quote:AAPL", "150.00", Duration::seconds(-1))
            .await
            .unwrap();
        assert!(repo.get("market_data", "quote:AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn different_domains_are_independent() {
        let repo = repo().await;
        repo.put("market_data", "k", "v1", Duration::seconds(60)).await.unwrap();
        repo.put("lookup", "k", "v2", Duration::seconds(60)).await.unwrap();
        assert_eq!(repo.get("market_data", "k").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(repo.get("lookup", "k").await.unwrap().as_deref(), Some("v2"));
    }
}
