use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    blocks_started: AtomicU64,
    blocks_succeeded: AtomicU64,
    blocks_failed: AtomicU64,
    retry_count: AtomicU64,
    samples_migrated: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub blocks_started: u64,
    pub blocks_succeeded: u64,
    pub blocks_failed: u64,
    pub retry_count: u64,
    pub samples_migrated: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_started(&self) {
        self.inner.blocks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_succeeded(&self) {
        self.inner.blocks_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.inner.blocks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.inner.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_samples(&self, count: u64) {
        self.inner
            .samples_migrated
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_started: self.inner.blocks_started.load(Ordering::Relaxed),
            blocks_succeeded: self.inner.blocks_succeeded.load(Ordering::Relaxed),
            blocks_failed: self.inner.blocks_failed.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            samples_migrated: self.inner.samples_migrated.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
