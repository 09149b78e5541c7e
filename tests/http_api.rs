//! Smoke-tests the HTTP control surface (§6.2) end to end through
//! `Application::build`, exercising the router the way a real client would
//! rather than calling handlers directly.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rust_decimal::Decimal;
use sentinel::application::bootstrap::Application;
use sentinel::config::{ClientMode, Config};
use tower::ServiceExt;

async fn build_app() -> Arc<Application> {
    let data_dir = std::env::temp_dir().join(format!("sentinel-http-test-{}", uuid::Uuid::new_v4()));
    let config = Config {
        data_dir,
        http_addr: "127.0.0.1:0".to_string(),
        log_level: "error".to_string(),
        client_mode: ClientMode::Mock,
        base_currency: "USD".to_string(),
        mock_starting_cash: Decimal::from(100_000),
    };
    Arc::new(Application::build(config).await.unwrap())
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = build_app().await;
    let router = sentinel::interfaces::http::router(app);

    let response = router
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn system_status_reports_the_current_portfolio_hash() {
    let app = build_app().await;
    let router = sentinel::interfaces::http::router(app);

    let response = router
        .oneshot(Request::builder().uri("/api/system/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.get("portfolio_hash").is_some());
}

#[tokio::test]
async fn settings_round_trip_through_put_and_get() {
    let app = build_app().await;
    let router = sentinel::interfaces::http::router(app);

    let put_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/settings/trading_mode")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"value":"research"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(put_response.status(), StatusCode::OK);

    let get_response = router
        .oneshot(Request::builder().uri("/api/settings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);
    let body = body_json(get_response).await;
    assert_eq!(body.get("trading_mode").and_then(|v| v.as_str()), Some("research"));
}

#[tokio::test]
async fn unknown_security_returns_not_found_with_an_error_envelope() {
    let app = build_app().await;
    let router = sentinel::interfaces::http::router(app);

    let response = router
        .oneshot(Request::builder().uri("/api/securities/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"]["kind"].is_string());
    assert!(body["error"]["correlation_id"].is_string());
}
