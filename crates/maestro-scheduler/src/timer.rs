//! One-shot timer pool.
//!
//! Exactly one pending timer per key; arming a key again cancels the
//! previous timer first. Delays are clamped to at least one second so
//! clock skew cannot produce a tight re-arm loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

const MIN_DELAY: Duration = Duration::from_secs(1);

struct TimerEntry {
    cancel: CancellationToken,
    generation: u64,
}

/// Cloneable handle over a shared set of pending one-shot timers.
#[derive(Clone, Default)]
pub struct TimerPool {
    timers: Arc<Mutex<HashMap<String, TimerEntry>>>,
    next_generation: Arc<AtomicU64>,
}

impl TimerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `key`. The callback runs once after
    /// `delay` unless the key is cancelled or re-armed first.
    pub fn arm<F, Fut>(&self, key: &str, delay: Duration, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let delay = delay.max(MIN_DELAY);
        let cancel = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let previous = {
            let mut timers = self.timers.lock().unwrap();
            timers.insert(
                key.to_string(),
                TimerEntry {
                    cancel: cancel.clone(),
                    generation,
                },
            )
        };
        if let Some(prev) = previous {
            prev.cancel.cancel();
        }

        let timers = Arc::clone(&self.timers);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(timer = %key, "timer cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => {
                    // Remove our own entry unless a re-arm replaced it.
                    {
                        let mut guard = timers.lock().unwrap();
                        if guard.get(&key).is_some_and(|e| e.generation == generation) {
                            guard.remove(&key);
                        }
                    }
                    callback().await;
                }
            }
        });
    }

    /// Cancel the pending timer for `key`, if any.
    pub fn cancel(&self, key: &str) -> bool {
        let entry = self.timers.lock().unwrap().remove(key);
        match entry {
            Some(e) => {
                e.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<TimerEntry> = {
            let mut timers = self.timers.lock().unwrap();
            timers.drain().map(|(_, e)| e).collect()
        };
        for e in drained {
            e.cancel.cancel();
        }
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.timers.lock().unwrap().contains_key(key)
    }
}
