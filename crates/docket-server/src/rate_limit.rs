//! Per-IP request rate limiting.
//!
//! A sliding window per client IP: a request is admitted while fewer than
//! `max_requests` requests landed within the trailing `window`.  The limiter
//! is an explicit value constructed once at startup and handed to the router,
//! so tests can build one with tiny limits.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Record a request from `ip` and report whether it is admitted.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let hits = windows.entry(ip).or_default();

        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }

        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Drop IPs with no requests inside the window.  Run periodically so the
    /// map does not grow with every address ever seen.
    pub async fn purge_stale(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, hits| {
            hits.back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
    }
}

impl Default for RateLimiter {
    /// 120 requests per minute per IP.
    fn default() -> Self {
        Self::new(120, Duration::from_secs(60))
    }
}

pub async fn rate_limit_middleware(
    axum::extract::State(limiter): axum::extract::State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = extract_client_ip(&req);

    if let Some(ip) = ip {
        if !limiter.check(ip).await {
            warn!(ip = %ip, "Rate limit exceeded");
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    Ok(next.run(req).await)
}

/// Try ConnectInfo first, then X-Forwarded-For, then X-Real-IP.
pub fn extract_client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(connect_info.0.ip());
    }

    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            if let Ok(ip) = value.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    None
}
