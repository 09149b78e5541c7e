//! `allocation` endpoint group (§6.2): `GET /allocation/targets`,
//! `PUT /allocation/targets/country`.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::bootstrap::Application;
use crate::domain::repositories::{AllocationGroupKind, AllocationTarget};
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::CorrelationId;

pub async fn list_targets(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<Vec<AllocationTarget>>, ApiError> {
    let targets = app.allocation_repo.all().await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(targets))
}

#[derive(Deserialize)]
pub struct CountryTargetBody {
    country: String,
    min_weight: Decimal,
    max_weight: Decimal,
}

pub async fn set_country_target(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
    Json(body): Json<CountryTargetBody>,
) -> Result<Json<AllocationTarget>, ApiError> {
    let target = AllocationTarget {
        group_kind: AllocationGroupKind::Country,
        group_key: body.country,
        min_weight: body.min_weight,
        max_weight: body.max_weight,
    };
    app.allocation_repo.upsert(&target).await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(target))
}
