//! `settings` endpoint group (§6.2): `GET /settings`, `PUT /settings/{key}`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Deserialize;

use crate::application::bootstrap::Application;
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::CorrelationId;

pub async fn list(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    let settings = app.settings_repo.all().await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(settings))
}

#[derive(Deserialize)]
pub struct SettingValueBody {
    value: String,
}

/// Writes a single raw key/value row (§6.4); `Settings::from_raw` falls back
/// to a default on the next read if the written value doesn't parse, so this
/// endpoint does not validate the value against the key's expected type.
pub async fn set(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
    Path(key): Path<String>,
    Json(body): Json<SettingValueBody>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    app.settings_repo.set(&key, &body.value).await.map_err(|e| ApiError::new(e, &cid))?;
    let mut out = HashMap::new();
    out.insert(key, body.value);
    Ok(Json(out))
}
