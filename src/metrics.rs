use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Domain counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub users_registered: Arc<AtomicU64>,
    pub logins: Arc<AtomicU64>,
    pub recipes_created: Arc<AtomicU64>,
    pub recipes_updated: Arc<AtomicU64>,
    pub recipes_deleted: Arc<AtomicU64>,
    pub shopping_lists_exported: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            users_registered: Arc::new(AtomicU64::new(0)),
            logins: Arc::new(AtomicU64::new(0)),
            recipes_created: Arc::new(AtomicU64::new(0)),
            recipes_updated: Arc::new(AtomicU64::new(0)),
            recipes_deleted: Arc::new(AtomicU64::new(0)),
            shopping_lists_exported: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_users_registered(&self) {
        self.users_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_logins(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_recipes_created(&self) {
        self.recipes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_recipes_updated(&self) {
        self.recipes_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_recipes_deleted(&self) {
        self.recipes_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_shopping_lists_exported(&self) {
        self.shopping_lists_exported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            users_registered: self.users_registered.load(Ordering::Relaxed),
            logins: self.logins.load(Ordering::Relaxed),
            recipes_created: self.recipes_created.load(Ordering::Relaxed),
            recipes_updated: self.recipes_updated.load(Ordering::Relaxed),
            recipes_deleted: self.recipes_deleted.load(Ordering::Relaxed),
            shopping_lists_exported: self.shopping_lists_exported.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub users_registered: u64,
    pub logins: u64,
    pub recipes_created: u64,
    pub recipes_updated: u64,
    pub recipes_deleted: u64,
    pub shopping_lists_exported: u64,
    pub uptime_seconds: u64,
}
