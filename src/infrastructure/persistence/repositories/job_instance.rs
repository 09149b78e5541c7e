//! `cache` store: `job_instances` execution history (§3, §4.1).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::RwLock;

use crate::domain::errors::SentinelError;
use crate::domain::repositories::JobInstanceRepository;
use crate::domain::scheduling::{JobInstance, JobOutcome};
use crate::infrastructure::persistence::database::Database;

pub struct SqliteJobInstanceRepository {
    db: Database,
}

impl SqliteJobInstanceRepository {
    pub async fn new(db: Database) -> Result<Self, SentinelError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_instances (
                id TEXT PRIMARY KEY,
                job_name TEXT NOT NULL,
                queued_at INTEGER NOT NULL,
                started_at INTEGER,
                finished_at INTEGER,
                outcome TEXT,
                retry_count INTEGER NOT NULL,
                correlation_id TEXT NOT NULL,
                result_payload TEXT,
                error TEXT
            )
            "#,
        )
        .execute(&db.pool)
        .await
        .map_err(integrity)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_job_instances_name_queued ON job_instances (job_name, queued_at)",
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

fn integrity_reason(reason: String) -> SentinelError {
    SentinelError::Integrity {
        store: "cache".into(),
        reason,
    }
}

fn outcome_to_str(outcome: JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Ok => "ok",
        JobOutcome::Failed => "failed",
        JobOutcome::Cancelled => "cancelled",
        JobOutcome::Timeout => "timeout",
    }
}

fn outcome_from_str(s: &str) -> Result<JobOutcome, SentinelError> {
    match s {
        "ok" => Ok(JobOutcome::Ok),
        "failed" => Ok(JobOutcome::Failed),
        "cancelled" => Ok(JobOutcome::Cancelled),
        "timeout" => Ok(JobOutcome::Timeout),
        other => Err(integrity_reason(format!("unknown job outcome '{other}'"))),
    }
}

fn epoch(ts: i64) -> Result<DateTime<Utc>, SentinelError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| integrity_reason(format!("invalid timestamp {ts}")))
}

#[derive(sqlx::FromRow)]
struct JobInstanceRow {
    id: String,
    job_name: String,
    queued_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    outcome: Option<String>,
    retry_count: i64,
    correlation_id: String,
    result_payload: Option<String>,
    error: Option<String>,
}

impl JobInstanceRow {
    fn into_domain(self) -> Result<JobInstance, SentinelError> {
        Ok(JobInstance {
            id: self.id,
            job_name: self.job_name,
            queued_at: epoch(self.queued_at)?,
            started_at: self.started_at.map(epoch).transpose()?,
            finished_at: self.finished_at.map(epoch).transpose()?,
            outcome: self.outcome.as_deref().map(outcome_from_str).transpose()?,
            retry_count: self.retry_count as u32,
            correlation_id: self.correlation_id,
            result_payload: self.result_payload,
            error: self.error,
        })
    }
}

const COLUMNS: &str = "id, job_name, queued_at, started_at, finished_at, outcome, retry_count, correlation_id, result_payload, error";

#[async_trait]
impl JobInstanceRepository for SqliteJobInstanceRepository {
    async fn insert(&self, instance: &JobInstance) -> Result<(), SentinelError> {
        sqlx::query(&format!(
            "INSERT INTO job_instances ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(&instance.id)
        .bind(&instance.job_name)
        .bind(instance.queued_at.timestamp())
        .bind(instance.started_at.map(|t| t.timestamp()))
        .bind(instance.finished_at.map(|t| t.timestamp()))
        .bind(instance.outcome.map(outcome_to_str))
        .bind(instance.retry_count as i64)
        .bind(&instance.correlation_id)
        .bind(&instance.result_payload)
        .bind(&instance.error)
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }

    async fn record_outcome(&self, instance: &JobInstance) -> Result<(), SentinelError> {
        sqlx::query(
            r#"
            UPDATE job_instances SET
                started_at = $1,
                finished_at = $2,
                outcome = $3,
                retry_count = $4,
                result_payload = $5,
                error = $6
            WHERE id = $7
            "#,
        )
        .bind(instance.started_at.map(|t| t.timestamp()))
        .bind(instance.finished_at.map(|t| t.timestamp()))
        .bind(instance.outcome.map(outcome_to_str))
        .bind(instance.retry_count as i64)
        .bind(&instance.result_payload)
        .bind(&instance.error)
        .bind(&instance.id)
        .execute(&self.db.pool)
        .await
        .map_err(integrity)?;

        Ok(())
    }

    async fn recent(&self, job_name: &str, limit: u32) -> Result<Vec<JobInstance>, SentinelError> {
        let rows = sqlx::query_as::<_, JobInstanceRow>(&format!(
            "SELECT {COLUMNS} FROM job_instances WHERE job_name = $1 ORDER BY queued_at DESC LIMIT $2"
        ))
        .bind(job_name)
        .bind(limit as i64)
        .fetch_all(&self.db.pool)
        .await
        .map_err(integrity)?;

        rows.into_iter().map(JobInstanceRow::into_domain).collect()
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, SentinelError> {
        let result = sqlx::query("DELETE FROM job_instances WHERE queued_at < $1")
            .bind(cutoff.timestamp())
            .execute(&self.db.pool)
            .await
            .map_err(integrity)?;

        Ok(result.rows_affected())
    }
}

/// Thread-safe in-memory double used by the queue manager and worker pool's
/// own unit tests, so those suites don't each need a real sqlite file.
#[derive(Default)]
pub struct InMemoryJobInstanceRepository {
    instances: Arc<RwLock<Vec<JobInstance>>>,
}

impl InMemoryJobInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobInstanceRepository for InMemoryJobInstanceRepository {
    async fn insert(&self, instance: &JobInstance) -> Result<(), SentinelError> {
        self.instances.write().await.push(instance.clone());
        Ok(())
    }

    async fn record_outcome(&self, instance: &JobInstance) -> Result<(), SentinelError> {
        let mut instances = self.instances.write().await;
        if let Some(existing) = instances.iter_mut().find(|i| i.id == instance.id) {
            *existing = instance.clone();
        }
        Ok(())
    }

    async fn recent(&self, job_name: &str, limit: u32) -> Result<Vec<JobInstance>, SentinelError> {
        let instances = self.instances.read().await;
        Ok(instances
            .iter()
            .rev()
            .filter(|i| i.job_name == job_name)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, SentinelError> {
        let mut instances = self.instances.write().await;
        let before = instances.len();
        instances.retain(|i| i.queued_at >= cutoff);
        Ok((before - instances.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteJobInstanceRepository {
        let db = Database::open_in_memory().await.unwrap();
        SqliteJobInstanceRepository::new(db).await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_recent_roundtrips() {
        let repo = repo().await;
        let instance = JobInstance::queued("universe_sync", "corr-1");
        repo.insert(&instance).await.unwrap();
        let recent = repo.recent("universe_sync", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, instance.id);
    }

    #[tokio::test]
    async fn record_outcome_updates_row() {
        let repo = repo().await;
        let mut instance = JobInstance::queued("universe_sync", "corr-1");
        repo.insert(&instance).await.unwrap();

        instance.started_at = Some(Utc::now());
        instance.finished_at = Some(Utc::now());
        instance.outcome = Some(JobOutcome::Ok);
        repo.record_outcome(&instance).await.unwrap();

        let recent = repo.recent("universe_sync", 10).await.unwrap();
        assert_eq!(recent[0].outcome, Some(JobOutcome::Ok));
    }

    #[tokio::test]
    async fn prune_older_than_removes_stale_rows() {
        let repo = repo().await;
        repo.insert(&JobInstance::queued("universe_sync", "corr-1"))
            .await
            .unwrap();
        let pruned = repo.prune_older_than(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(pruned, 1);
    }
}
