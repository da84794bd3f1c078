//! Fixed-window rate limiting, adapted from the teacher's
//! `middleware::rate_limit`: a `parking_lot::Mutex<HashMap<...>>` keyed by
//! client IP, reset every `window`.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let max_requests = std::env::var("RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);
        let window_secs = std::env::var("RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

struct RateLimitEntry {
    count: u32,
    window_started: Instant,
}

#[derive(Clone)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
    entries: Arc<Mutex<HashMap<IpAddr, RateLimitEntry>>>,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn check(&self, ip: IpAddr) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let entry = entries.entry(ip).or_insert_with(|| RateLimitEntry {
            count: 0,
            window_started: now,
        });
        if now.duration_since(entry.window_started) >= self.config.window {
            entry.count = 0;
            entry.window_started = now;
        }
        entry.count += 1;
        entry.count <= self.config.max_requests
    }
}

pub async fn rate_limit_middleware(
    axum::extract::State(layer): axum::extract::State<RateLimitLayer>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if layer.check(addr.ip()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::TOO_MANY_REQUESTS)
    }
}
