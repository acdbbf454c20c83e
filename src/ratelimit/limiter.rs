//! Sliding-window admission decisions over the shared store.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::WindowStore;

/// Decides whether an attempt against a namespace key is admissible under a
/// `(period, limit)` policy.
///
/// All state lives in the store; instances hold only the store handle and a
/// clock, so one limiter can be shared freely across tasks. Correctness under
/// concurrent callers comes from the store's atomic window update, never from
/// in-process locking.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter over `store` using the system clock.
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()))
    }

    /// Creates a limiter with an explicit time source.
    pub fn with_clock(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records the current attempt and returns whether it is admitted.
    ///
    /// The attempt is inserted before counting, so an attempt pushing the
    /// window past `limit` is still recorded and keeps consuming quota even
    /// though it reports as rejected. Rejected callers hammering retry thus
    /// stay rejected until they actually back off.
    #[tracing::instrument(skip(self))]
    pub async fn attempt(&self, key: &str, period: Duration, limit: u64) -> Result<bool> {
        let now = self.clock.now_micros();
        let count = self.store.update_window(key, now, period, true).await?;
        let admitted = count <= limit;
        if !admitted {
            debug!(key = %key, count = count, limit = limit, "attempt rejected");
        }
        Ok(admitted)
    }

    /// Returns whether the *next* attempt on `key` would be rejected, without
    /// consuming quota.
    #[tracing::instrument(skip(self))]
    pub async fn is_limited(&self, key: &str, period: Duration, limit: u64) -> Result<bool> {
        let now = self.clock.now_micros();
        let count = self.store.update_window(key, now, period, false).await?;
        Ok(count >= limit)
    }

    /// Whole seconds until the window behind `key` is expected to admit a new
    /// attempt; 0 when the key does not exist (identity unconstrained).
    pub async fn time_to_reset(&self, key: &str) -> Result<u64> {
        self.store.time_to_live(key).await
    }

    /// Unconditionally clears the window behind `key`. Resetting an absent
    /// key is a no-op, not an error.
    pub async fn reset(&self, key: &str) -> Result<()> {
        debug!(key = %key, "resetting window");
        self.store.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::FloodgateError;
    use crate::store::MemoryStore;

    const T0: u64 = 1_700_000_000_000_000;
    const KEY: &str = "test:rl:default:1.2.3.4";

    fn limiter() -> (Arc<ManualClock>, Arc<MemoryStore>, SlidingWindowLimiter) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryStore::new(clock.clone() as Arc<dyn Clock>));
        let limiter = SlidingWindowLimiter::with_clock(
            store.clone() as Arc<dyn WindowStore>,
            clock.clone() as Arc<dyn Clock>,
        );
        (clock, store, limiter)
    }

    #[tokio::test]
    async fn test_window_admits_up_to_limit() {
        let (_, _, limiter) = limiter();
        let period = Duration::from_secs(60);

        for i in 0..5 {
            assert!(
                limiter.attempt(KEY, period, 5).await.unwrap(),
                "attempt {} should be admitted",
                i + 1
            );
        }
        assert!(!limiter.attempt(KEY, period, 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_expires_after_period() {
        let (clock, _, limiter) = limiter();
        let period = Duration::from_secs(60);

        for _ in 0..3 {
            limiter.attempt(KEY, period, 3).await.unwrap();
        }
        assert!(!limiter.attempt(KEY, period, 3).await.unwrap());

        clock.advance(Duration::from_secs(61));
        assert!(
            limiter.attempt(KEY, period, 3).await.unwrap(),
            "window should be empty after the period elapses"
        );
    }

    #[tokio::test]
    async fn test_rejected_attempts_still_consume_quota() {
        let (clock, _, limiter) = limiter();
        let period = Duration::from_secs(60);

        // 8 rapid attempts against limit 3: 3 admitted, 5 rejected but all
        // recorded.
        for i in 0..8 {
            let admitted = limiter.attempt(KEY, period, 3).await.unwrap();
            assert_eq!(admitted, i < 3);
        }

        // Half the window later the rejected entries are still present, so
        // the window has not quietly reset early.
        clock.advance(Duration::from_secs(30));
        assert!(limiter.is_limited(KEY, period, 3).await.unwrap());
        assert!(!limiter.attempt(KEY, period, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_is_limited_does_not_consume_quota() {
        let (_, _, limiter) = limiter();
        let period = Duration::from_secs(60);

        for _ in 0..10 {
            assert!(!limiter.is_limited(KEY, period, 1).await.unwrap());
        }

        assert!(limiter.attempt(KEY, period, 1).await.unwrap());
        assert!(limiter.is_limited(KEY, period, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_and_clears_window() {
        let (_, _, limiter) = limiter();
        let period = Duration::from_secs(60);

        // Resetting a key that never existed is fine.
        limiter.reset(KEY).await.unwrap();

        for _ in 0..3 {
            limiter.attempt(KEY, period, 3).await.unwrap();
        }
        assert!(!limiter.attempt(KEY, period, 3).await.unwrap());

        limiter.reset(KEY).await.unwrap();
        assert!(
            limiter.attempt(KEY, period, 3).await.unwrap(),
            "first attempt after reset behaves as a fresh window"
        );
    }

    #[tokio::test]
    async fn test_time_to_reset_tracks_window() {
        let (clock, _, limiter) = limiter();
        let period = Duration::from_secs(60);

        assert_eq!(limiter.time_to_reset(KEY).await.unwrap(), 0);

        limiter.attempt(KEY, period, 3).await.unwrap();
        clock.advance(Duration::from_millis(1500));

        let wait = limiter.time_to_reset(KEY).await.unwrap();
        assert!(wait > 0 && wait <= 60, "unexpected wait_time {wait}");
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let (_, store, limiter) = limiter();
        store.sever();

        let err = limiter
            .attempt(KEY, Duration::from_secs(60), 3)
            .await
            .unwrap_err();
        assert!(
            matches!(err, FloodgateError::StoreUnavailable(_)),
            "store outage must surface as an error, not a deny: {err}"
        );
    }

    #[tokio::test]
    async fn test_concurrent_attempts_each_recorded() {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryStore::new(clock.clone() as Arc<dyn Clock>));
        let limiter = SlidingWindowLimiter::with_clock(
            store.clone() as Arc<dyn WindowStore>,
            clock as Arc<dyn Clock>,
        );
        let period = Duration::from_secs(60);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.attempt(KEY, period, 10).await.unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        // Every attempt fully completes its atomic unit, so exactly `limit`
        // of the racers win.
        assert_eq!(admitted, 10);
    }
}
