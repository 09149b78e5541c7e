//! `recommendation_gc`: evicts expired recommendation rows from the `cache`
//! store (§3 "garbage-collected by the recommendation-GC job").

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::application::queue::{JobContext, JobHandler};
use crate::domain::errors::SentinelError;
use crate::domain::repositories::RecommendationRepository;

pub struct RecommendationGcJob {
    recommendation_repo: Arc<dyn RecommendationRepository>,
}

impl RecommendationGcJob {
    pub fn new(recommendation_repo: Arc<dyn RecommendationRepository>) -> Self {
        Self { recommendation_repo }
    }
}

#[async_trait]
impl JobHandler for RecommendationGcJob {
    async fn run(&self, _ctx: JobContext, _payload: Value) -> Result<Value, SentinelError> {
        let evicted = self.recommendation_repo.evict_expired().await?;
        info!(evicted, "recommendation_gc completed");
        Ok(json!({ "evicted": evicted }))
    }
}
