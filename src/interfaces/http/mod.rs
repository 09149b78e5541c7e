//! Axum HTTP control surface (§6.2). Grounded on the reference backend's
//! `api::routes` module: a plain `Router<Arc<Application>>` with
//! `CorsLayer`/`TraceLayer` from `tower-http` and a correlation-id
//! middleware in front of every route, rather than a framework-specific
//! request lifecycle.
//!
//! Trusted-local surface: no authentication layer, because the daemon binds
//! to `127.0.0.1` by default (§6.2, §9 open question resolution) and is
//! single-user. Rate limiting exists to blunt an accidental local retry
//! storm, not to guard against a hostile caller.

pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::application::bootstrap::Application;
use middleware::{correlation_id_middleware, general_rate_limit, mutating_rate_limit, RateLimitState};

/// Builds the full router. `app` backs every handler's `State<Arc<Application>>`
/// extractor; a second, independent `RateLimitState` backs the two
/// rate-limiting middleware layers.
pub fn router(app: Arc<Application>) -> Router {
    let rate_limits = Arc::new(RateLimitState::new());

    let mutating_routes = Router::new()
        .route("/system/jobs/:name", axum::routing::post(handlers::system::trigger_job))
        .route("/trades/execute", axum::routing::post(handlers::trading::execute))
        .route(
            "/trades/recommendations/execute",
            axum::routing::post(handlers::recommendations::execute),
        )
        .route(
            "/planner/regenerate-sequences",
            axum::routing::post(handlers::planning::regenerate),
        )
        .route("/allocation/targets/country", put(handlers::allocation::set_country_target))
        .route("/securities/:security_id", put(handlers::securities::put))
        .route("/settings/:key", put(handlers::settings::set))
        .route_layer(axum::middleware::from_fn_with_state(rate_limits.clone(), mutating_rate_limit));

    let read_routes = Router::new()
        .route("/health", get(handlers::system::health))
        .route("/system/status", get(handlers::system::system_status))
        .route("/system/jobs", get(handlers::system::list_jobs))
        .route("/portfolio/summary", get(handlers::portfolio::summary))
        .route("/portfolio/cash", get(handlers::portfolio::cash_breakdown))
        .route("/portfolio/analytics", get(handlers::portfolio::analytics))
        .route("/trades", get(handlers::trading::list_trades))
        .route("/trades/recommendations", get(handlers::recommendations::current))
        .route("/planner/status", get(handlers::planning::status))
        .route("/allocation/targets", get(handlers::allocation::list_targets))
        .route("/securities", get(handlers::securities::list))
        .route("/securities/:security_id", get(handlers::securities::get))
        .route("/settings", get(handlers::settings::list));

    Router::new()
        .nest(
            "/api",
            read_routes
                .merge(mutating_routes)
                .route_layer(axum::middleware::from_fn_with_state(rate_limits, general_rate_limit)),
        )
        .layer(axum::middleware::from_fn(correlation_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}
