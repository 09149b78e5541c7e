//! `planning` endpoint group (§6.2): `POST /planner/regenerate-sequences`,
//! `GET /planner/status`.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::application::bootstrap::Application;
use crate::domain::scheduling::Priority;
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::CorrelationId;

#[derive(Serialize)]
pub struct RegenerateResponse {
    portfolio_hash: String,
    job_instance_id: String,
}

/// Forces a fresh `planner_batch` for the current portfolio hash (§4.4),
/// deduped against any in-flight batch for that same hash exactly as the
/// event-driven chain already is (§4.1, §9 open question resolution).
pub async fn regenerate(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<RegenerateResponse>, ApiError> {
    let snapshot = app.trading_loop.status_snapshot().await.map_err(|e| ApiError::new(e, &cid))?;
    let correlation_id = Uuid::new_v4().to_string();
    let instance_id = app
        .queue
        .enqueue_job(
            "planner_batch",
            serde_json::json!({ "portfolio_hash": snapshot.portfolio_hash }),
            Priority::Normal,
            Some(format!("planner_batch|{}", snapshot.portfolio_hash)),
            &correlation_id,
        )
        .await;
    Ok(Json(RegenerateResponse { portfolio_hash: snapshot.portfolio_hash, job_instance_id: instance_id }))
}

#[derive(Serialize)]
pub struct PlannerStatus {
    portfolio_hash: String,
    has_cached_plan: bool,
    queue_depth: usize,
}

pub async fn status(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<PlannerStatus>, ApiError> {
    let snapshot = app.trading_loop.status_snapshot().await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(PlannerStatus {
        portfolio_hash: snapshot.portfolio_hash,
        has_cached_plan: snapshot.has_cached_plan,
        queue_depth: app.queue.depth().await,
    }))
}
