//! `trading` endpoint group (§6.2): `POST /trades/execute`, `GET /trades`.
//!
//! `POST /trades/execute` enforces the same guardrails as the trading loop
//! (§6.2, §4.5) by delegating to `TradingLoop::execute_plan_now` rather than
//! placing a broker order directly -- the HTTP layer never bypasses
//! `CHECK_GUARDS`.

use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::application::bootstrap::Application;
use crate::domain::trading::Trade;
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::CorrelationId;

pub async fn execute(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<Trade>, ApiError> {
    let trade = app.trading_loop.execute_plan_now().await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(trade))
}

#[derive(Deserialize)]
pub struct TradesQuery {
    since: Option<DateTime<Utc>>,
}

pub async fn list_trades(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Vec<Trade>>, ApiError> {
    let since = query.since.unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_else(Utc::now));
    let trades = app.ledger_repo.trades_since(since).await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(trades))
}
