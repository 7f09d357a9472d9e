//! Rate Limiter - Per-Tool Token Bucket Admission
//!
//! Each configured tool gets a bucket holding up to `capacity` tokens that
//! refill continuously at `refill_per_second`. Admission atomically checks
//! and decrements; a rejected call consumes nothing. Tools without a bucket
//! are unlimited.

use crate::clock::TimeSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Admission control behind the pipeline.
pub trait RateLimiter: Send + Sync {
    /// Try to take one token for `tool`. True = admitted.
    fn try_acquire(&self, tool: &str) -> bool;
}

/// Null limiter: always admits. Used when rate limiting is disabled.
#[derive(Debug, Default)]
pub struct NullRateLimiter;

impl RateLimiter for NullRateLimiter {
    fn try_acquire(&self, _tool: &str) -> bool {
        true
    }
}

/// One tool's bucket configuration.
#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    /// Maximum burst size.
    pub capacity: u32,

    /// Sustained refill rate, tokens per second.
    pub refill_per_second: f64,
}

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    refill_per_second: f64,
    tokens: f64,
    last_refill: SystemTime,
}

impl Bucket {
    fn try_acquire(&mut self, now: SystemTime) -> bool {
        // Refill for elapsed time, clamped to capacity. A clock that moved
        // backwards contributes nothing.
        let elapsed = now
            .duration_since(self.last_refill)
            .unwrap_or_default()
            .as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token-bucket limiter with one bucket per configured tool.
///
/// The bucket table is immutable after startup; each bucket's counter is
/// updated under its own lock.
pub struct TokenBucketLimiter {
    clock: Arc<dyn TimeSource>,
    buckets: HashMap<String, Mutex<Bucket>>,
}

impl TokenBucketLimiter {
    /// Create a limiter from per-tool bucket configs (case-insensitive tool
    /// names) and a time source.
    pub fn new(configs: HashMap<String, BucketConfig>, clock: Arc<dyn TimeSource>) -> Self {
        let now = clock.now();
        let buckets = configs
            .into_iter()
            .map(|(tool, cfg)| {
                let bucket = Bucket {
                    capacity: f64::from(cfg.capacity),
                    refill_per_second: cfg.refill_per_second,
                    tokens: f64::from(cfg.capacity),
                    last_refill: now,
                };
                (tool.to_lowercase(), Mutex::new(bucket))
            })
            .collect();
        Self { clock, buckets }
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn try_acquire(&self, tool: &str) -> bool {
        match self.buckets.get(&tool.to_lowercase()) {
            Some(bucket) => {
                let mut bucket = bucket.lock().expect("Rate limit bucket lock poisoned");
                bucket.try_acquire(self.clock.now())
            }
            // No configured bucket: unlimited.
            None => true,
        }
    }
}
