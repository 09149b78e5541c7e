//! `recommendations` endpoint group (§6.2): `GET /trades/recommendations`,
//! `POST /trades/recommendations/execute`. The hash-keyed `recommendations`
//! row is the sole authoritative surface (§9 open question resolution) --
//! no `recommendations:3` / `sell_recommendations:3` legacy keys are built.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;

use crate::application::bootstrap::Application;
use crate::domain::errors::SentinelError;
use crate::domain::planning::Plan;
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::CorrelationId;

pub async fn current(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<Plan>, ApiError> {
    let snapshot = app.trading_loop.status_snapshot().await.map_err(|e| ApiError::new(e, &cid))?;
    let raw = app
        .recommendation_repo
        .get(&snapshot.portfolio_hash)
        .await
        .map_err(|e| ApiError::new(e, &cid))?
        .ok_or_else(|| {
            ApiError::new(
                SentinelError::NotFound(format!("no recommendation cached for hash {}", snapshot.portfolio_hash)),
                &cid,
            )
        })?;
    let plan: Plan = serde_json::from_str(&raw).map_err(|err| {
        ApiError::new(SentinelError::Integrity { store: "cache".into(), reason: err.to_string() }, &cid)
    })?;
    Ok(Json(plan))
}

pub async fn execute(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<crate::domain::trading::Trade>, ApiError> {
    let trade = app.trading_loop.execute_plan_now().await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(trade))
}
