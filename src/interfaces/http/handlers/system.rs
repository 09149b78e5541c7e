//! `system` endpoint group (§6.2): `GET /health`, `GET /system/status`,
//! `GET /system/jobs`, `POST /system/jobs/{name}`.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::application::bootstrap::Application;
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::CorrelationId;

pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Serialize)]
pub struct SystemStatus {
    portfolio_hash: String,
    trading_mode: String,
    halt_level: String,
    total_equity: String,
    has_cached_plan: bool,
    queue_depth: usize,
}

pub async fn system_status(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<SystemStatus>, ApiError> {
    let snapshot = app
        .trading_loop
        .status_snapshot()
        .await
        .map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(SystemStatus {
        portfolio_hash: snapshot.portfolio_hash,
        trading_mode: snapshot.trading_mode.to_string(),
        halt_level: format!("{:?}", snapshot.halt_level),
        total_equity: snapshot.total_equity.to_string(),
        has_cached_plan: snapshot.has_cached_plan,
        queue_depth: app.queue.depth().await,
    }))
}

#[derive(Serialize)]
pub struct JobRow {
    name: &'static str,
    cadence: Option<String>,
    market_gate: String,
    priority: String,
    max_attempts: u32,
}

pub async fn list_jobs(State(app): State<Arc<Application>>) -> Json<Vec<JobRow>> {
    let mut rows: Vec<JobRow> = app
        .registry
        .names()
        .into_iter()
        .filter_map(|name| app.registry.spec(name))
        .map(|spec| JobRow {
            name: spec.name,
            cadence: spec.cadence.map(|c| format!("{c:?}")),
            market_gate: format!("{:?}", spec.market_gate),
            priority: format!("{:?}", spec.priority),
            max_attempts: spec.max_attempts,
        })
        .collect();
    rows.sort_by_key(|r| r.name);
    Json(rows)
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    job_instance_id: String,
}

pub async fn trigger_job(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
    Path(name): Path<String>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let spec = app
        .registry
        .spec(&name)
        .ok_or_else(|| ApiError::new(crate::domain::errors::SentinelError::NotFound(format!("job {name}")), &cid))?;
    let priority = spec.priority;
    let correlation_id = Uuid::new_v4().to_string();
    let instance_id = app.queue.enqueue_job(&name, Value::Null, priority, None, &correlation_id).await;
    Ok(Json(EnqueueResponse { job_instance_id: instance_id }))
}
