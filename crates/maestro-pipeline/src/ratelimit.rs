//! Keyed rate limiting with idle-bucket purging.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Buckets idle longer than this are purged.
const IDLE_PURGE_AFTER: Duration = Duration::from_secs(3600);
/// How often a purge sweep may run.
const PURGE_INTERVAL: Duration = Duration::from_secs(600);

struct Bucket {
    window_start: Instant,
    count: u32,
    last_seen: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    window: Duration,
    max_per_window: u32,
    last_purge: std::sync::Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_per_window: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            window,
            max_per_window,
            last_purge: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Record one hit for `key`; false when the key is over budget.
    pub fn allow(&self, key: &str) -> bool {
        self.maybe_purge();

        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
            last_seen: now,
        });

        bucket.last_seen = now;
        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;
        bucket.count <= self.max_per_window
    }

    fn maybe_purge(&self) {
        let mut last = self.last_purge.lock().unwrap();
        if last.elapsed() < PURGE_INTERVAL {
            return;
        }
        *last = Instant::now();
        drop(last);

        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| b.last_seen.elapsed() < IDLE_PURGE_AFTER);
        let purged = before.saturating_sub(self.buckets.len());
        if purged > 0 {
            debug!(purged, "idle rate-limit buckets purged");
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
