use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Global token bucket shared by the Upstream Fetcher and the Data Collector.
/// Refills to `capacity` once every 24h; both callers draw from the same pool
/// so a backfill run cannot starve the hybrid provider's live reads.
pub struct TokenBucket {
    inner: Arc<RwLock<BucketState>>,
    capacity: u32,
    wait_budget: Duration,
}

struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, wait_budget: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            capacity,
            wait_budget,
        }
    }

    async fn refill_if_due(&self, state: &mut BucketState) {
        if state.last_refill.elapsed() >= Duration::from_secs(86_400) {
            state.tokens = self.capacity;
            state.last_refill = Instant::now();
        }
    }

    /// Attempts to take one token; waits up to `wait_budget` then fails.
    pub async fn acquire(&self) -> anyhow::Result<()> {
        let deadline = Instant::now() + self.wait_budget;
        loop {
            {
                let mut state = self.inner.write().await;
                self.refill_if_due(&mut state).await;
                if state.tokens > 0 {
                    state.tokens -= 1;
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                warn!("token bucket exhausted, wait budget elapsed");
                anyhow::bail!("rate limited: token bucket exhausted");
            }
            sleep(Duration::from_millis(25)).await;
        }
    }

    /// Non-blocking check used by the Data Collector to decide whether to defer.
    pub async fn remaining(&self) -> u32 {
        let mut state = self.inner.write().await;
        self.refill_if_due(&mut state).await;
        debug!(tokens = state.tokens, "token bucket remaining");
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_until_exhausted_then_fails_fast() {
        let bucket = TokenBucket::new(2, Duration::from_millis(50));
        bucket.acquire().await.unwrap();
        bucket.acquire().await.unwrap();
        assert!(bucket.acquire().await.is_err());
    }

    #[tokio::test]
    async fn remaining_reflects_consumption() {
        let bucket = TokenBucket::new(5, Duration::from_millis(50));
        bucket.acquire().await.unwrap();
        assert_eq!(bucket.remaining().await, 4);
    }
}
