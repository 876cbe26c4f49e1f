//! Sliding-window rate limiting for the login endpoint
//!
//! Clients are identified by the socket peer address. Behind a trusted proxy
//! (`TRUST_PROXY_HEADERS`) the first `X-Forwarded-For` address is used instead.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;

use crate::error::AppError;
use crate::state::AppState;

const WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32, reset_secs: u64 },
    Limited { retry_after_secs: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    hits: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Record a request from `client` at `now` unless it is over the limit
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let mut hits = self.hits.lock();
        hits.retain(|_, window| {
            while window
                .front()
                .is_some_and(|&t| now.saturating_duration_since(t) >= WINDOW)
            {
                window.pop_front();
            }
            !window.is_empty()
        });
        let window = hits.entry(client.to_string()).or_default();

        let reset_secs = |oldest: Option<&Instant>| {
            oldest
                .map(|&t| WINDOW.saturating_sub(now.saturating_duration_since(t)).as_secs())
                .unwrap_or(0)
        };

        if window.len() >= self.limit as usize {
            return RateDecision::Limited {
                retry_after_secs: reset_secs(window.front()).max(1),
            };
        }

        window.push_back(now);
        RateDecision::Allowed {
            remaining: self.limit - window.len() as u32,
            reset_secs: reset_secs(window.front()),
        }
    }

    /// Clients with hits inside the current window
    pub fn tracked_clients(&self) -> usize {
        self.hits.lock().len()
    }
}

fn client_id(req: &Request, trust_proxy: bool) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(forwarded) = forwarded.filter(|_| trust_proxy) {
        return forwarded.to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applying the login limiter
pub async fn limit_login(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let client = client_id(&req, state.auth.trust_proxy_headers);

    match state.login_limiter.check(&client) {
        RateDecision::Limited { retry_after_secs } => {
            tracing::warn!(client = %client, "Login rate limit exceeded");
            AppError::RateLimited(retry_after_secs).into_response()
        }
        RateDecision::Allowed {
            remaining,
            reset_secs,
        } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset_secs));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_per_client() {
        let limiter = RateLimiter::per_minute(2);
        let t0 = Instant::now();

        assert_eq!(
            limiter.check_at("a", t0),
            RateDecision::Allowed {
                remaining: 1,
                reset_secs: 60
            }
        );
        assert!(matches!(limiter.check_at("a", t0), RateDecision::Allowed { remaining: 0, .. }));
        assert!(matches!(limiter.check_at("a", t0), RateDecision::Limited { .. }));
        assert!(matches!(limiter.check_at("b", t0), RateDecision::Allowed { .. }));
    }

    #[test]
    fn test_expired_clients_are_dropped() {
        let limiter = RateLimiter::per_minute(2);
        let t0 = Instant::now();

        for i in 0..500 {
            limiter.check_at(&format!("10.0.{}.{}", i / 256, i % 256), t0);
        }
        assert_eq!(limiter.tracked_clients(), 500);

        limiter.check_at("10.9.9.9", t0 + Duration::from_secs(180));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    fn login_request(forwarded: &str, peer: [u8; 4]) -> Request {
        let mut req = http::Request::builder()
            .uri("/login")
            .header("x-forwarded-for", forwarded)
            .body(axum::body::Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        req
    }

    #[test]
    fn test_forwarded_header_needs_trusted_proxy() {
        let req = login_request("203.0.113.7, 10.0.0.1", [192, 168, 1, 5]);

        assert_eq!(client_id(&req, false), "192.168.1.5");
        assert_eq!(client_id(&req, true), "203.0.113.7");
    }

    #[test]
    fn test_rotating_forwarded_header_shares_peer_limit() {
        let limiter = RateLimiter::per_minute(2);
        let t0 = Instant::now();

        let allowed = (0..20)
            .map(|i| login_request(&format!("198.51.100.{}", i), [192, 168, 1, 5]))
            .filter(|req| {
                matches!(
                    limiter.check_at(&client_id(req, false), t0),
                    RateDecision::Allowed { .. }
                )
            })
            .count();
        assert_eq!(allowed, 2);
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::per_minute(1);
        let t0 = Instant::now();

        assert!(matches!(limiter.check_at("a", t0), RateDecision::Allowed { .. }));
        assert_eq!(
            limiter.check_at("a", t0 + Duration::from_secs(45)),
            RateDecision::Limited {
                retry_after_secs: 15
            }
        );
        assert!(matches!(
            limiter.check_at("a", t0 + Duration::from_secs(60)),
            RateDecision::Allowed { .. }
        ));
    }
}
