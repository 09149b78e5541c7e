//! `cache` store: `recommendations` table (§3, §9 resolved open question).
//!
//! The `portfolio_hash`-keyed row here is the sole authoritative
//! recommendation surface -- no versioned `recommendations:N` legacy
//! surface is built alongside it (§9).

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::domain::errors::SentinelError;
use crate::domain::repositories::RecommendationRepository;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteRecommendationRepository {
    db: Database,
}

impl SqliteRecommendationRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recommendations (
                portfolio_hash TEXT PRIMARY KEY,
                steps_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
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
        store: "cache".into(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl RecommendationRepository for SqliteRecommendationRepository {
    async fn put(
        &self,
        portfolio_hash: &str,
        plan_json: &str,
        ttl: Duration,
    ) -> Result<(), SentinelError> {
        let now = Utc::now();
        let expires = now + ttl;

        sqlx::query(
            r#"
            INSERT INTO recommendations (portfolio_hash, steps_json, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(portfolio_hash) DO UPDATE SET
                steps_json = excluded.steps_json,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(portfolio_hash)
        .bind(plan_json)
        .bind(now.timestamp())
        .bind(expires.timestamp())
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }

    async fn get(&self, portfolio_hash: &str) -> Result<Option<String>, SentinelError> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT steps_json, expires_at FROM recommendations WHERE portfolio_hash = $1",
        )
        .bind(portfolio_hash)
        .fetch_optional(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(row.and_then(|(json, expires_at)| {
            if expires_at >= Utc::now().timestamp() {
                Some(json)
            } else {
                None
            }
        }))
    }

    async fn invalidate(&self, portfolio_hash: &str) -> Result<(), SentinelError> {
        sqlx::query("DELETE FROM recommendations WHERE portfolio_hash = $1")
            .bind(portfolio_hash)
            .execute(&self.db.pool)
            .await
            .map_err(integrity)?;

        Ok(())
    }

    async fn evict_expired(&self) -> Result<u64, SentinelError> {
        let result = sqlx::query("DELETE FROM recommendations WHERE expires_at < $1")
            .bind(Utc::now().timestamp())
            .execute(&self.db.pool)
            .await
            .map_err(integrity)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteRecommendationRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqliteRecommendationRepository::new(db).await.unwrap()
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let repo = repo().await;
        repo.put("hash1", r#"{"steps":[]}"#, Duration::hours(24))
            .await
            .unwrap();
        let got = repo.get("hash1").await.unwrap();
        assert_eq!(got.as_deref(), Some(r#"{"steps":[]}"#));
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let repo = repo().await;
        repo.put("hash1", "{}", Duration::seconds(-1)).await.unwrap();
        assert!(repo.get("hash1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let repo = repo().await;
        repo.put("hash1", "{}", Duration::hours(24)).await.unwrap();
        repo.invalidate("hash1").await.unwrap();
        assert!(repo.get("hash1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn evict_expired_counts_rows_removed() {
        let repo = repo().await;
        repo.put("hash1", "{}", Duration::seconds(-1)).await.unwrap();
        repo.put("hash2", "{}", Duration::hours(24)).await.unwrap();
        let evicted = repo.evict_expired().await.unwrap();
        assert_eq!(evicted, 1);
    }
}
