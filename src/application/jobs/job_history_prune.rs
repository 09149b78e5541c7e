//! `job_history_prune`: bounds retention of the `cache` store's job
//! instance history (§3 "bounded retention").

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::info;

use crate::application::queue::{JobContext, JobHandler};
use crate::domain::errors::SentinelError;
use crate::domain::repositories::JobInstanceRepository;

const RETENTION_DAYS: i64 = 30;

pub struct JobHistoryPruneJob {
    job_instance_repo: Arc<dyn JobInstanceRepository>,
}

impl JobHistoryPruneJob {
    pub fn new(job_instance_repo: Arc<dyn JobInstanceRepository>) -> Self {
        Self { job_instance_repo }
    }
}

#[async_trait]
impl JobHandler for JobHistoryPruneJob {
    async fn run(&self, _ctx: JobContext, _payload: Value) -> Result<Value, SentinelError> {
        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        let pruned = self.job_instance_repo.prune_older_than(cutoff).await?;
        info!(pruned, retention_days = RETENTION_DAYS, "job_history_prune completed");
        Ok(json!({ "pruned": pruned }))
    }
}
