//! Single error-to-HTTP mapper (§7): every handler converts its
//! `SentinelError` into one `ApiError` which renders the
//! `{error:{kind,message,correlation_id}}` envelope `§6.2` requires.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::errors::SentinelError;

use super::middleware::CorrelationId;

pub struct ApiError {
    err: SentinelError,
    correlation_id: String,
}

impl ApiError {
    pub fn new(err: SentinelError, correlation_id: &CorrelationId) -> Self {
        Self {
            err,
            correlation_id: correlation_id.0.clone(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
    correlation_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.err.kind(),
                message: self.err.to_string(),
                correlation_id: self.correlation_id,
            },
        };
        (status, Json(body)).into_response()
    }
}
