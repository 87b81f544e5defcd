//! Retry/backoff policy for reconciliation requeues
//!
//! Combines a per-key exponential failure delay with a global token
//! bucket, taking the larger of the two. The exponential term grows with
//! a key's consecutive failures and is reset by the queueing layer once
//! the key reconciles cleanly. The token bucket is shared across every
//! key of every controller and caps sustained retry throughput while
//! allowing short bursts.
//!
//! A key is never rejected outright. A permanently-failing key keeps
//! retrying forever at the capped interval.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::BackoffConfig;

/// Combined per-key exponential and global token-bucket backoff
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    failures: Mutex<HashMap<String, u32>>,
    bucket: Mutex<TokenBucket>,
}

impl BackoffPolicy {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            base: config.base_delay,
            cap: config.max_delay,
            failures: Mutex::new(HashMap::new()),
            bucket: Mutex::new(TokenBucket::new(config.rate, config.burst)),
        }
    }

    /// Record a failure for `key` and return the delay before it may be
    /// processed again.
    pub fn next_delay(&self, key: &str) -> Duration {
        self.next_delay_at(key, Instant::now())
    }

    fn next_delay_at(&self, key: &str, now: Instant) -> Duration {
        let failures = {
            let mut map = self.failures.lock();
            let count = map.entry(key.to_string()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        let exponential = exponential_delay(self.base, self.cap, failures);
        let throttle = self.bucket.lock().reserve(now);
        exponential.max(throttle)
    }

    /// Forget a key's failure history after a clean reconciliation
    pub fn reset(&self, key: &str) {
        self.failures.lock().remove(key);
    }
}

/// `base * 2^(failures-1)`, capped
fn exponential_delay(base: Duration, cap: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let shift = (failures - 1).min(63);
    let nanos = base.as_nanos() << shift;
    if nanos >= cap.as_nanos() {
        cap
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

/// Token bucket with reservation semantics: a caller past the burst gets
/// a wait time instead of a rejection, and the balance goes negative so
/// queued callers space out at the sustained rate.
struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            tokens: f64::from(burst),
            last: Instant::now(),
        }
    }

    fn reserve(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last = now;
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }
}
