//! `X-Correlation-Id` propagation and per-IP rate limiting (§6.2).
//!
//! Grounded on the same "one shared limiter per concern" shape as
//! `infrastructure::rate_limiter::RateLimiters`, but keyed by client IP and
//! a sliding window instead of a token bucket -- the two endpoint classes
//! (`general` 60/min, `mutating` 10/min) need independent counters so a
//! burst of mutating calls can't exhaust the read-only budget or vice versa.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const HEADER_CORRELATION_ID: &str = "x-correlation-id";

/// Mints one if the incoming request carries none, so every handler and log
/// line downstream has a stable id to key on (§6.2).
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

pub async fn correlation_id_middleware(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(HEADER_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(CorrelationId(id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(HEADER_CORRELATION_ID, value);
    }
    response
}

/// Sliding-window per-IP request counter. `limit` requests per `window`;
/// requests beyond that return `429` without reaching the handler.
pub struct IpRateLimiter {
    hits: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
}

impl IpRateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
            limit,
            window,
        }
    }

    async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let window = self.window;
        let entry = hits.entry(ip).or_insert_with(VecDeque::new);
        while let Some(front) = entry.front() {
            if now.duration_since(*front) > window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() >= self.limit {
            return false;
        }
        entry.push_back(now);
        true
    }
}

/// §6.2: 60 requests/min/IP general, 10 requests/min/IP on mutating
/// endpoints. Two independent limiters so each class has its own budget.
pub struct RateLimitState {
    pub general: IpRateLimiter,
    pub mutating: IpRateLimiter,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            general: IpRateLimiter::new(60, Duration::from_secs(60)),
            mutating: IpRateLimiter::new(10, Duration::from_secs(60)),
        }
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

fn client_ip(req: &Request<axum::body::Body>) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

pub async fn general_rate_limit(
    State(limits): State<Arc<RateLimitState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    if !limits.general.check(ip).await {
        return too_many_requests();
    }
    next.run(req).await
}

pub async fn mutating_rate_limit(
    State(limits): State<Arc<RateLimitState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    if !limits.mutating.check(ip).await {
        return too_many_requests();
    }
    next.run(req).await
}

fn too_many_requests() -> Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let limiter = IpRateLimiter::new(2, Duration::from_secs(60));
        let ip = IpAddr::from([127, 0, 0, 1]);
        assert!(limiter.check(ip).await);
        assert!(limiter.check(ip).await);
        assert!(!limiter.check(ip).await);
    }

    #[tokio::test]
    async fn different_ips_have_independent_budgets() {
        let limiter = IpRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(IpAddr::from([127, 0, 0, 1])).await);
        assert!(limiter.check(IpAddr::from([127, 0, 0, 2])).await);
    }
}
