//! Pacing of classifier calls.
//!
//! Orchestrators call [`RateLimiter::acquire`] before every classification so
//! the external service is never hit above its ceiling.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Default spacing between classifier calls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Trait for call pacing strategies.
pub trait RateLimiter: Send + Sync {
    /// Waits until one more call is allowed.
    fn acquire(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// No pacing at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Keeps consecutive calls at least `interval` apart.
///
/// The first call passes immediately.
#[derive(Debug)]
pub struct FixedInterval {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl FixedInterval {
    /// Creates a limiter with the given spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }
}

impl RateLimiter for FixedInterval {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut next_slot = self.next_slot.lock().await;
            if let Some(slot) = *next_slot {
                sleep_until(slot).await;
            }
            *next_slot = Some(Instant::now() + self.interval);
        })
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket allowing bursts of `capacity` calls, refilled at one token
/// per `refill_every`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_every: Duration,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// A zero capacity is raised to one so callers can always make progress.
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_every,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        if self.refill_every.is_zero() {
            bucket.tokens = self.capacity;
        } else {
            let elapsed = now.duration_since(bucket.last_refill);
            let earned = elapsed.as_secs_f64() / self.refill_every.as_secs_f64();
            bucket.tokens = (bucket.tokens + earned).min(self.capacity);
        }
        bucket.last_refill = now;
    }
}

impl RateLimiter for TokenBucket {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut bucket = self.bucket.lock().await;
            self.refill(&mut bucket, Instant::now());

            if bucket.tokens < 1.0 {
                let missing = 1.0 - bucket.tokens;
                let wait = self.refill_every.mul_f64(missing);
                sleep_until(bucket.last_refill + wait).await;
                self.refill(&mut bucket, Instant::now());
            }

            bucket.tokens = (bucket.tokens - 1.0).max(0.0);
        })
    }
}
