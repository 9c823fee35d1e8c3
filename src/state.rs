use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::RateLimits;

/// The shared application state.
///
/// Cloned into every handler by Axum's `State` extractor; all fields are cheap
/// handles (`Arc`s or pools).
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Arc<AppConfig>,
    /// Request and domain counters exposed on `/metrics`.
    pub metrics: Metrics,
    pub rate_limits: RateLimits,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let rate_limits = RateLimits::from_config(&config.rate_limit);
        Self { db, config: Arc::new(config), metrics: Metrics::new(), rate_limits }
    }
}
