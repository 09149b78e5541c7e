//! `securities` endpoint group (§6.2): `GET /securities`,
//! `GET /securities/{security_id}`, `PUT /securities/{security_id}`.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;

use crate::application::bootstrap::Application;
use crate::domain::errors::SentinelError;
use crate::domain::securities::Security;
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::CorrelationId;

pub async fn list(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<Vec<Security>>, ApiError> {
    let securities = app.security_repo.all().await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(securities))
}

pub async fn get(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
    Path(security_id): Path<String>,
) -> Result<Json<Security>, ApiError> {
    let security = app
        .security_repo
        .get(&security_id)
        .await
        .map_err(|e| ApiError::new(e, &cid))?
        .ok_or_else(|| ApiError::new(SentinelError::NotFound(format!("security {security_id}")), &cid))?;
    Ok(Json(security))
}

/// Upserts a security row (§2). The path's `security_id` is authoritative;
/// a body disagreeing with it is rejected rather than silently renaming.
pub async fn put(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
    Path(security_id): Path<String>,
    Json(mut body): Json<Security>,
) -> Result<Json<Security>, ApiError> {
    if body.security_id != security_id {
        return Err(ApiError::new(
            SentinelError::Validation("security_id in path and body must match".into()),
            &cid,
        ));
    }
    body.security_id = security_id;
    app.security_repo.upsert(&body).await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(body))
}
