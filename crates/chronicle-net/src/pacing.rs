//! Per-webhook delivery pacing.
//!
//! Each webhook gets its own token bucket so concurrent runs do not eat
//! each other's budget. Callers wait for a token instead of being rejected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chronicle_shared::Snowflake;
use tokio::sync::Mutex;
use tracing::trace;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
    }

    /// Take a token, or report how long until one is available.
    fn try_consume(&mut self, rate: f64, capacity: f64) -> Result<(), Duration> {
        self.refill(rate, capacity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / rate))
        }
    }
}

#[derive(Clone)]
pub struct DeliveryPacer {
    buckets: Arc<Mutex<HashMap<Snowflake, TokenBucket>>>,
    rate: f64,
    capacity: f64,
}

impl DeliveryPacer {
    /// `rate` tokens per second, bursts of up to `capacity`.
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate: rate.max(f64::MIN_POSITIVE),
            capacity: capacity.max(1.0),
        }
    }

    /// Non-blocking variant of [`acquire`](Self::acquire).
    pub async fn check(&self, key: Snowflake) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_consume(self.rate, self.capacity).is_ok()
    }

    /// Wait until `key` may make another delivery call.
    pub async fn acquire(&self, key: Snowflake) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let bucket = buckets
                    .entry(key)
                    .or_insert_with(|| TokenBucket::new(self.capacity));
                match bucket.try_consume(self.rate, self.capacity) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            trace!(webhook = %key, wait_ms = wait.as_millis() as u64, "pacing delivery");
            tokio::time::sleep(wait).await;
        }
    }

    /// Drop the bucket of a webhook that has been deleted.
    pub async fn forget(&self, key: Snowflake) {
        self.buckets.lock().await.remove(&key);
    }
}

impl Default for DeliveryPacer {
    fn default() -> Self {
        Self::new(1.0, 5.0)
    }
}
