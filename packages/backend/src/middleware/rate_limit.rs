use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header::RETRY_AFTER, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::config::RateLimitSettings;
use crate::response::json_error;
use crate::state::AppState;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let limiter = state.rate_limiter();
    if !limiter.settings.enabled || !matches_api_prefix(req.uri().path()) {
        return next.run(req).await;
    }

    let Some(ip) = extract_client_ip(&req, limiter.settings.trust_proxy) else {
        return next.run(req).await;
    };
    if ip.is_loopback() {
        return next.run(req).await;
    }

    let check = limiter.check(ip, crate::time::now_ms().max(0) as u64).await;
    if !check.allowed {
        tracing::warn!(%ip, "rate limit exceeded");
        let mut res = json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "TOO_MANY_REQUESTS",
            "Too many requests, please try again later",
        )
        .into_response();
        apply_rate_limit_headers(&mut res, check);
        return res;
    }

    let mut res = next.run(req).await;
    apply_rate_limit_headers(&mut res, check);
    res
}

fn apply_rate_limit_headers(res: &mut Response, check: RateLimitCheck) {
    if let Ok(value) = HeaderValue::from_str(&check.limit.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.remaining.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_REMAINING, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.reset_after_seconds.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_RESET, value.clone());
        if !check.allowed {
            res.headers_mut().insert(RETRY_AFTER, value);
        }
    }
}

fn matches_api_prefix(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

#[derive(Debug)]
struct LimiterState {
    entries: HashMap<IpAddr, Window>,
    last_cleanup_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start_ms: u64,
    hits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCheck {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_after_seconds: u64,
}

/// Fixed-window counter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(LimiterState {
                entries: HashMap::new(),
                last_cleanup_ms: 0,
            }),
        }
    }

    pub async fn check(&self, ip: IpAddr, now_ms: u64) -> RateLimitCheck {
        let window_ms = self.settings.window_ms.max(1);
        let max = self.settings.max;
        let mut state = self.state.lock().await;

        if now_ms.saturating_sub(state.last_cleanup_ms) >= window_ms {
            state
                .entries
                .retain(|_, w| now_ms.saturating_sub(w.start_ms) < window_ms);
            state.last_cleanup_ms = now_ms;
        }

        let window = state.entries.entry(ip).or_insert(Window {
            start_ms: now_ms,
            hits: 0,
        });
        if now_ms.saturating_sub(window.start_ms) >= window_ms {
            window.start_ms = now_ms;
            window.hits = 0;
        }

        window.hits = window.hits.saturating_add(1);
        let allowed = window.hits <= max;
        let reset_after_ms = window_ms.saturating_sub(now_ms.saturating_sub(window.start_ms));

        RateLimitCheck {
            allowed,
            limit: max,
            remaining: max.saturating_sub(window.hits),
            reset_after_seconds: reset_after_ms.div_ceil(1000),
        }
    }
}

fn extract_client_ip(req: &Request<Body>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = extract_x_forwarded_for(req) {
            return Some(ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or(Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)))
}

fn extract_x_forwarded_for(req: &Request<Body>) -> Option<IpAddr> {
    let raw = req
        .headers()
        .get(HeaderName::from_static("x-forwarded-for"))?
        .to_str()
        .ok()?;
    raw.split(',').next()?.trim().parse::<IpAddr>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u64) -> RateLimiter {
        RateLimiter::new(RateLimitSettings {
            enabled: true,
            window_ms: 1_000,
            max,
            trust_proxy: false,
        })
    }

    #[tokio::test]
    async fn test_blocks_after_max_hits() {
        let limiter = limiter(2);
        let ip: IpAddr = "203.0.113.7".parse().unwrap();

        assert!(limiter.check(ip, 10).await.allowed);
        let second = limiter.check(ip, 20).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.check(ip, 30).await;
        assert!(!third.allowed);
        assert_eq!(third.reset_after_seconds, 1);

        let other: IpAddr = "203.0.113.8".parse().unwrap();
        assert!(limiter.check(other, 30).await.allowed);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter(1);
        let ip: IpAddr = "198.51.100.1".parse().unwrap();
        assert!(limiter.check(ip, 0).await.allowed);
        assert!(!limiter.check(ip, 500).await.allowed);
        assert!(limiter.check(ip, 1_000).await.allowed);
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let req = Request::builder()
            .uri("/api/lessons")
            .header("x-forwarded-for", "192.0.2.5, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extract_client_ip(&req, true),
            Some("192.0.2.5".parse().unwrap())
        );
        assert_eq!(
            extract_client_ip(&req, false),
            Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        );
    }
}
