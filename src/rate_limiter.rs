use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Token bucket limiter for courier provider HTTP calls.
///
/// Providers meter merchant API traffic; a burst of dispatches from the
/// order table must not trip their limits.
#[derive(Clone)]
pub struct TokenBucket {
    capacity: usize,
    fill_rate_per_sec: f64,
    state: Arc<Mutex<BucketState>>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: usize, fill_rate_per_sec: f64) -> Self {
        Self {
            capacity,
            fill_rate_per_sec,
            state: Arc::new(Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Try to take `amount` tokens. Returns false when the bucket is empty.
    pub fn try_acquire(&self, amount: usize) -> bool {
        let mut state = self.state.lock();

        let elapsed = state.last_refill.elapsed().as_secs_f64();
        let refill = elapsed * self.fill_rate_per_sec;
        if refill > 0.0 {
            state.tokens = (state.tokens + refill).min(self.capacity as f64);
            state.last_refill = Instant::now();
        }

        if state.tokens >= amount as f64 {
            state.tokens -= amount as f64;
            true
        } else {
            false
        }
    }

    /// Take tokens, waiting until they refill if necessary.
    pub async fn acquire(&self, amount: usize) {
        loop {
            if self.try_acquire(amount) {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
    }
}
