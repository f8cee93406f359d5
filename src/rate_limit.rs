//! Pacing for calls to rate-limited external services.
//!
//! Batch callers are configured once with a [`Pacer`] instead of sleeping
//! at each call site. Two strategies are provided:
//! - [`FixedDelay`]: a unit of work starts at least `delay` after the
//!   previous one finished.
//! - [`TokenBucket`]: bursts up to `capacity`, then refills at a fixed rate.
//!
//! [`pacer_from_config`] picks one from `[embedding]` settings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::EmbeddingConfig;

#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait until the next unit of work may start.
    async fn ready(&self);

    /// Mark the current unit of work as finished.
    async fn done(&self) {}
}

/// No pacing at all.
pub struct Unpaced;

#[async_trait]
impl Pacer for Unpaced {
    async fn ready(&self) {}
}

/// Fixed-delay sequencer. The first call never waits.
///
/// The delay counts from the last [`done`](Pacer::done), or from the last
/// start when `done` was never called, so slow work still gets a pause
/// after it.
pub struct FixedDelay {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Pacer for FixedDelay {
    async fn ready(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.delay).await;
        }
        *last = Some(Instant::now());
    }

    async fn done(&self) {
        *self.last.lock().await = Some(Instant::now());
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket holding up to `capacity` tokens, refilled continuously at
/// `per_second` tokens per second.
pub struct TokenBucket {
    capacity: f64,
    per_second: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(capacity: u32, per_second: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            per_second: per_second.max(f64::MIN_POSITIVE),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }
}

#[async_trait]
impl Pacer for TokenBucket {
    async fn ready(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.per_second).min(self.capacity);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.per_second)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Build the pacer named by `embedding.pacer`.
///
/// `"fixed"` waits `batch_delay_ms` between batches; `"token_bucket"` allows
/// `burst` batches at once and `batches_per_second` after that.
pub fn pacer_from_config(config: &EmbeddingConfig) -> Arc<dyn Pacer> {
    match config.pacer.as_str() {
        "token_bucket" => Arc::new(TokenBucket::new(config.burst, config.batches_per_second)),
        _ => Arc::new(FixedDelay::new(config.batch_delay())),
    }
}
