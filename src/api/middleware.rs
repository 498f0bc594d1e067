//! Optional API-key auth and a fixed-window rate limiter (§6 "an optional
//! `X-API-Key` header check and a simple per-IP rate limit").
//!
//! Shaped after the CORS/trace/compression tower layers in `api/mod.rs`
//! — this module adds the two extra layers a single-operator dashboard
//! never needed, in the same `tower::Layer` shape.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::state::AppState;

/// Rejects requests missing a matching `X-API-Key` header when `api_key`
/// is configured; a no-op when it is not (§6 "if unset, the check is
/// skipped entirely").
pub async fn require_api_key(
    State(app): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }
    if let Some(expected) = &app.api_key {
        let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            let body = serde_json::json!({"error": {"code": "unauthorized", "message": "missing or invalid X-API-Key"}});
            return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
        }
    }
    next.run(request).await
}

/// One minute fixed window per client IP, reset lazily on the next request
/// past the window boundary rather than on a background tick.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
}

struct Window {
    count: u32,
    started_at: Instant,
}

const WINDOW: Duration = Duration::from_secs(60);

impl RateLimiter {
    fn check(&self, ip: IpAddr, limit: u32) -> Result<(), Duration> {
        let mut windows = self.windows.lock().unwrap_or_else(|poison| poison.into_inner());
        let now = Instant::now();
        let entry = windows.entry(ip).or_insert(Window { count: 0, started_at: now });

        if now.duration_since(entry.started_at) >= WINDOW {
            entry.count = 0;
            entry.started_at = now;
        }

        if entry.count >= limit {
            let retry_after = WINDOW.saturating_sub(now.duration_since(entry.started_at));
            return Err(retry_after);
        }

        entry.count += 1;
        Ok(())
    }
}

pub async fn rate_limit(
    State(app): State<AppState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let Some(limit) = app.rate_limit_per_minute else {
        return next.run(request).await;
    };
    match app.limiter.check(addr.ip(), limit) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            let body = serde_json::json!({
                "error": {"code": "rate_limited", "message": "too many requests"}
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
            if let Ok(value) = retry_after.as_secs().to_string().parse::<axum::http::HeaderValue>() {
                response.headers_mut().insert("Retry-After", value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_then_blocks() {
        let limiter = RateLimiter::default();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check(ip, 5).is_ok());
        }
        assert!(limiter.check(ip, 5).is_err());
    }

    #[test]
    fn rate_limiter_tracks_ips_independently() {
        let limiter = RateLimiter::default();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check(a, 1).is_ok());
        assert!(limiter.check(a, 1).is_err());
        assert!(limiter.check(b, 1).is_ok());
    }
}
