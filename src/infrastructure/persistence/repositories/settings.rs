//! `config` store: `settings` key-value table (§6.4).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::errors::SentinelError;
use crate::domain::repositories::SettingsRepository;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteSettingsRepository {
    db: Database,
}

impl SqliteSettingsRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
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
        store: "config".into(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn all(&self) -> Result<HashMap<String, String>, SentinelError> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.db.pool)
            .await
            .map_err(integrity)?;

        Ok(rows.into_iter().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SentinelError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.db.pool)
                .await
                .map_err(integrity)?;

        Ok(row.map(|(v,)| v))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteSettingsRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqliteSettingsRepository::new(db).await.unwrap()
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let repo = repo().await;
        repo.set("trading_mode", "live").await.unwrap();
        assert_eq!(repo.get("trading_mode").await.unwrap().as_deref(), Some("live"));
    }

    #[tokio::test]
    async fn set_overwrites_existing_key() {
        let repo = repo().await;
        repo.set("k", "v1").await.unwrap();
        repo.set("k", "v2").await.unwrap();
        assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let repo = repo().await;
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn all_returns_every_key() {
        let repo = repo().await;
        repo.set("a", "1").await.unwrap();
        repo.set("b", "2").await.unwrap();
        let all = repo.all().await.unwrap();
        assert_eq!(all.get("a").map(String::as_str), Some("1"));
        assert_eq!(all.get("b").map(String::as_str), Some("2"));
    }
}
