//! Sliding-window request limits keyed by client IP.
//!
//! [`RateLimits`] bundles one limiter for all traffic with tighter limiters for
//! the endpoints that are expensive or abusable: login (password hashing),
//! registration and the shopping list export (PDF rendering).

use super::ip::extract_ip_from_headers;
use crate::config::RateLimitConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use axum::{
    extract::{connect_info::ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Request timestamps per client inside one window.
#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { hits: Arc::new(Mutex::new(HashMap::new())), max_requests, window }
    }

    fn expired(&self, now: Instant, at: Instant) -> bool {
        // A timestamp from the future (clock skew) counts as live
        now.checked_duration_since(at).is_some_and(|age| age >= self.window)
    }

    /// Counts a request from `ip`, failing with [`AppError::RateLimited`] once the
    /// window is full. Rejected requests are not counted.
    pub async fn hit(&self, ip: IpAddr) -> AppResult<()> {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let queue = hits.entry(ip).or_default();

        while queue.front().is_some_and(|&at| self.expired(now, at)) {
            queue.pop_front();
        }

        if queue.len() >= self.max_requests {
            let wait = queue
                .front()
                .and_then(|&oldest| now.checked_duration_since(oldest))
                .map(|elapsed| self.window.saturating_sub(elapsed))
                .unwrap_or(Duration::from_secs(1));
            return Err(AppError::RateLimited { retry_after_seconds: wait.as_secs().max(1) });
        }

        queue.push_back(now);
        Ok(())
    }

    /// Forgets clients whose requests have all left the window.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        hits.retain(|_, queue| {
            queue.retain(|&at| !self.expired(now, at));
            !queue.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.hits.lock().await.len()
    }
}

/// Endpoints with a dedicated limit on top of the global one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Register,
    ShoppingListExport,
}

/// The global limiter plus the per-endpoint ones, built from [`RateLimitConfig`].
#[derive(Clone)]
pub struct RateLimits {
    global: RateLimiter,
    endpoints: Arc<HashMap<Endpoint, RateLimiter>>,
}

impl RateLimits {
    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        let minute = Duration::from_secs(60);
        let endpoints = HashMap::from([
            (Endpoint::Login, RateLimiter::new(cfg.login_per_minute, minute)),
            (Endpoint::Register, RateLimiter::new(cfg.register_per_minute, minute)),
            (Endpoint::ShoppingListExport, RateLimiter::new(cfg.export_per_minute, minute)),
        ]);
        Self {
            global: RateLimiter::new(cfg.max_requests, Duration::from_secs(cfg.window_seconds)),
            endpoints: Arc::new(endpoints),
        }
    }

    pub async fn check_global(&self, ip: IpAddr) -> AppResult<()> {
        self.global.hit(ip).await
    }

    pub async fn check_endpoint(&self, endpoint: Endpoint, ip: IpAddr) -> AppResult<()> {
        let Some(limiter) = self.endpoints.get(&endpoint) else {
            return Ok(());
        };
        limiter.hit(ip).await.inspect_err(|_| {
            tracing::warn!("Rate limit hit on {:?} for {}", endpoint, ip);
        })
    }

    /// Sweeps every limiter; run periodically from `main`.
    pub async fn sweep_all(&self) {
        self.global.sweep().await;
        for limiter in self.endpoints.values() {
            limiter.sweep().await;
        }
    }
}

/// Applies the global limit to every request.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let remote_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let ip = extract_ip_from_headers(req.headers(), remote_ip);

    match state.rate_limits.check_global(ip).await {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!("Global rate limit hit for {}", ip);
            e.into_response()
        }
    }
}
