//! Per-client token-bucket admission control.
//!
//! Each client key lazily receives a bucket that starts full at `burst` tokens
//! and refills continuously at `rps` tokens per second. Admission never waits:
//! a request either takes a token or is refused immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::config::LimiterConfig;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl Bucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            refilled_at: now,
        }
    }

    fn try_take(&mut self, rps: f64, burst: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rps).min(burst);
        self.refilled_at = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Client {
    bucket: Bucket,
    /// Eviction bookkeeping only; admission looks at the bucket
    last_seen: Instant,
}

pub struct RateLimiter {
    enabled: bool,
    rps: f64,
    burst: f64,
    stale_after: Duration,
    clients: Mutex<HashMap<String, Client>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Builds a limiter without a background sweeper.
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            enabled: config.enabled,
            rps: config.rps.max(0.0),
            burst: f64::from(config.burst),
            stale_after: Duration::from_secs(config.stale_after_secs),
            clients: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Builds a limiter and starts its eviction task on the current runtime.
    /// The task holds only a weak reference and ends with the limiter.
    pub fn spawn(config: &LimiterConfig) -> Arc<Self> {
        let limiter = Arc::new(Self::new(config));
        if limiter.enabled {
            let period = Duration::from_secs(config.sweep_interval_secs.max(1));
            let handle = tokio::spawn(sweep_loop(Arc::downgrade(&limiter), period));
            *lock(&limiter.sweeper) = Some(handle);
        }
        limiter
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    pub fn admit_at(&self, key: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut clients = lock(&self.clients);
        let client = clients.entry(key.to_owned()).or_insert_with(|| Client {
            bucket: Bucket::full(self.burst, now),
            last_seen: now,
        });
        client.last_seen = now;
        client.bucket.try_take(self.rps, self.burst, now)
    }

    /// Drops clients idle for longer than the staleness threshold and returns
    /// how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = lock(&self.clients);
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= self.stale_after);
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        lock(&self.clients).len()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.sweeper).take() {
            handle.abort();
        }
    }
}

async fn sweep_loop(limiter: Weak<RateLimiter>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(limiter) = limiter.upgrade() else {
            return;
        };
        let evicted = limiter.sweep_at(Instant::now());
        if evicted > 0 {
            debug!(evicted, remaining = limiter.tracked_clients(), "rate limiter sweep");
        }
    }
}

// A panic while holding the lock leaves the table usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
