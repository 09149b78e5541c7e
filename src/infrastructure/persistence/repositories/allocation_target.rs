//! `config` store: `allocation_targets` table (§3, §4.4.1).

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::SentinelError;
use crate::domain::repositories::{AllocationGroupKind, AllocationTarget, AllocationTargetRepository};
use crate::infrastructure::persistence::database::Database;

pub struct SqliteAllocationTargetRepository {
    db: Database,
}

impl SqliteAllocationTargetRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS allocation_targets (
                group_kind TEXT NOT NULL,
                group_key TEXT NOT NULL,
                min_weight TEXT NOT NULL,
                max_weight TEXT NOT NULL,
                PRIMARY KEY (group_kind, group_key)
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

fn kind_to_str(kind: AllocationGroupKind) -> &'static str {
    match kind {
        AllocationGroupKind::Country => "country",
        AllocationGroupKind::Industry => "industry",
    }
}

fn kind_from_str(s: &str) -> Result<AllocationGroupKind, SentinelError> {
    match s {
        "country" => Ok(AllocationGroupKind::Country),
        "industry" => Ok(AllocationGroupKind::Industry),
        other => Err(integrity_reason(format!(
            "unknown allocation group kind '{other}'"
        ))),
    }
}

#[async_trait]
impl AllocationTargetRepository for SqliteAllocationTargetRepository {
    async fn all(&self) -> Result<Vec<AllocationTarget>, SentinelError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT group_kind, group_key, min_weight, max_weight FROM allocation_targets",
        )
        .fetch_all(&self.db.pool)
        .await
        .map_err(integrity)?;

        rows.into_iter()
            .map(|(kind, key, min_w, max_w)| {
                Ok(AllocationTarget {
                    group_kind: kind_from_str(&kind)?,
                    group_key: key,
                    min_weight: Decimal::from_str(&min_w).map_err(|e| integrity_reason(e.to_string()))?,
                    max_weight: Decimal::from_str(&max_w).map_err(|e| integrity_reason(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn upsert(&self, target: &AllocationTarget) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            INSERT INTO allocation_targets (group_kind, group_key, min_weight, max_weight)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(group_kind, group_key) DO UPDATE SET
                min_weight = excluded.min_weight,
                max_weight = excluded.max_weight
            "#,
        )
        .bind(kind_to_str(target.group_kind))
        .bind(&target.group_key)
        .bind(target.min_weight.to_string())
        .bind(target.max_weight.to_string())
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }
}

fn integrity_reason(reason: String) -> SentinelError {
    SentinelError::Integrity {
        store: "config".into(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteAllocationTargetRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqliteAllocationTargetRepository::new(db).await.unwrap()
    }

    #[tokio::test]
    async fn upsert_then_all_roundtrips() {
        let repo = repo().await;
        repo.upsert(&AllocationTarget {
            group_kind: AllocationGroupKind::Country,
            group_key: "US".into(),
            min_weight: Decimal::new(10, 2),
            max_weight: Decimal::new(40, 2),
        })
        .await
        .unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].group_key, "US");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_group() {
        let repo = repo().await;
        let target = AllocationTarget {
            group_kind: AllocationGroupKind::Industry,
            group_key: "TECH".into(),
            min_weight: Decimal::ZERO,
            max_weight: Decimal::new(30, 2),
        };
        repo.upsert(&target).await.unwrap();
        repo.upsert(&AllocationTarget {
            max_weight: Decimal::new(50, 2),
            ..target
        })
        .await
        .unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].max_weight, Decimal::new(50, 2));
    }
}
