//! Per-client rate limiting over the shared key-value store.
//!
//! Requests are counted in fixed one-minute windows keyed by client IP,
//! using the same store and the same best-effort contract as the circuit
//! breaker: a slow or unreachable store fails open and the request goes
//! through. Expired windows age out of the store via TTL, so there is no
//! eviction task to run.
//!
//! This is the only place in the system that produces a 429. Upstream
//! provider rate limits are absorbed by the router and never surface here.

use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

use vitae_core::KvStore;

use crate::metrics::Metrics;

/// The fixed counting window.
const WINDOW: Duration = Duration::from_secs(60);
/// Deadline on each store operation; timeout means fail-open.
const STORE_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for the rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests allowed per client IP per window.
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
        }
    }
}

/// Windowed request counter for clients.
///
/// All counting state lives in the store under
/// `ratelimit:{ip}:requests` (counter, TTL = window) and
/// `ratelimit:{ip}:reset_at` (unix timestamp the window ends), so every
/// worker sharing the store enforces the same budget.
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    config: RateLimitConfig,
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self { kv, config }
    }

    /// Count a request from the given IP against the current window.
    /// Returns Err(retry_after_secs) when the budget is spent. Store
    /// failures allow the request.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        if !self.config.enabled || self.config.requests_per_minute == 0 {
            return Ok(());
        }

        let count_key = format!("ratelimit:{ip}:requests");
        let reset_key = format!("ratelimit:{ip}:reset_at");

        let count = match tokio::time::timeout(STORE_TIMEOUT, self.kv.incr(&count_key)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(client_ip = %ip, error = %e, "rate limit store failed, failing open");
                return Ok(());
            }
            Err(_) => {
                warn!(client_ip = %ip, "rate limit store timed out, failing open");
                return Ok(());
            }
        };

        // First request of a window starts its clock.
        if count == 1 {
            let reset_at = now_unix() + WINDOW.as_secs_f64();
            let _ = tokio::time::timeout(STORE_TIMEOUT, self.kv.expire(&count_key, WINDOW)).await;
            let _ = tokio::time::timeout(
                STORE_TIMEOUT,
                self.kv.set(&reset_key, &reset_at.to_string(), Some(WINDOW)),
            )
            .await;
        }

        if count <= self.config.requests_per_minute as i64 {
            return Ok(());
        }

        let retry_after = match tokio::time::timeout(STORE_TIMEOUT, self.kv.get(&reset_key)).await
        {
            Ok(Ok(Some(raw))) => raw
                .parse::<f64>()
                .map(|reset_at| (reset_at - now_unix()).ceil().max(1.0) as u64)
                .unwrap_or(WINDOW.as_secs()),
            _ => WINDOW.as_secs(),
        };
        Err(retry_after)
    }
}

/// Axum middleware enforcing the per-client budget and recording
/// rejections in the server metrics.
pub async fn rate_limit_middleware(
    State((limiter, metrics)): State<(RateLimiter, Metrics)>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);

    match limiter.check(ip).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            metrics.inc_rate_limit_rejections();
            warn!(client_ip = %ip, retry_after, "rate limited");
            let mut resp = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "detail": "Rate limit exceeded. Please wait before making more requests.",
                    "error_type": "rate_limit",
                    "retry_after": retry_after,
                })),
            )
                .into_response();
            if let Ok(value) = retry_after.to_string().parse() {
                resp.headers_mut().insert("retry-after", value);
            }
            resp
        }
    }
}

/// Client IP from the forwarding header, defaulting to localhost.
fn client_ip(req: &Request<axum::body::Body>) -> IpAddr {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
}
