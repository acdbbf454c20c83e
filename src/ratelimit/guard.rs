//! Higher-order guard wrapping protected operations.

use std::future::Future;

use tracing::debug;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::rules::DEFAULT_RULE;
use crate::ratelimit::{RuleResolver, SlidingWindowLimiter};

/// Runs operations only when the limiter admits them.
///
/// Stateless across calls: the resolver and limiter carry shared handles and
/// every decision round-trips the store, so the same guard can wrap the same
/// operation from any number of tasks or processes without in-memory locking.
#[derive(Clone)]
pub struct ThrottleGuard {
    resolver: RuleResolver,
    limiter: SlidingWindowLimiter,
}

impl ThrottleGuard {
    pub fn new(resolver: RuleResolver, limiter: SlidingWindowLimiter) -> Self {
        Self { resolver, limiter }
    }

    /// Admits or rejects one attempt by `identity` under `rule_name`
    /// (defaulting to `"default"`), running `operation` only when admitted.
    ///
    /// On rejection the operation is never invoked and the error carries the
    /// seconds to wait before the window is expected to have capacity. Rule
    /// resolution happens before any store I/O, so an unknown rule name fails
    /// without touching the store. Store errors propagate unmodified; whether
    /// to then fail open or closed is the caller's policy.
    pub async fn guard<F, Fut, T>(
        &self,
        rule_name: Option<&str>,
        identity: &str,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let rule_name = rule_name.unwrap_or(DEFAULT_RULE);
        let rule = self.resolver.resolve(rule_name)?;
        let key = self.resolver.make_key(rule_name, identity);

        if self.limiter.attempt(&key, rule.period, rule.limit).await? {
            return Ok(operation().await);
        }

        let wait_time = self.limiter.time_to_reset(&key).await?;
        debug!(
            rule = rule_name,
            identity = identity,
            wait_time = wait_time,
            "request rejected by rate limit"
        );
        Err(FloodgateError::RateLimitExceeded { wait_time })
    }

    /// The rule resolver backing this guard.
    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    /// The limiter backing this guard.
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::ratelimit::Rule;
    use crate::store::{MemoryStore, WindowStore};

    const T0: u64 = 1_700_000_000_000_000;

    fn guard_fixture() -> (Arc<ManualClock>, Arc<MemoryStore>, ThrottleGuard) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryStore::new(clock.clone() as Arc<dyn Clock>));

        let mut rules = HashMap::new();
        rules.insert(
            "login".to_string(),
            Rule {
                period: Duration::from_secs(60),
                limit: 3,
            },
        );
        let resolver = RuleResolver::new("test:rl", rules);
        let limiter = SlidingWindowLimiter::with_clock(
            store.clone() as Arc<dyn WindowStore>,
            clock.clone() as Arc<dyn Clock>,
        );

        (clock, store, ThrottleGuard::new(resolver, limiter))
    }

    #[tokio::test]
    async fn test_admitted_operation_result_returned_unchanged() {
        let (_, _, guard) = guard_fixture();

        let result = guard
            .guard(Some("login"), "1.2.3.4", || async { 41 + 1 })
            .await
            .unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_rejected_operation_never_runs() {
        let (_, _, guard) = guard_fixture();
        let runs = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let runs = runs.clone();
            guard
                .guard(Some("login"), "1.2.3.4", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }

        let result = {
            let runs = runs.clone();
            guard
                .guard(Some("login"), "1.2.3.4", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                })
                .await
        };

        let err = result.unwrap_err();
        let wait = err.wait_time().expect("denial must carry wait_time");
        assert!(wait > 0 && wait <= 60);
        assert_eq!(runs.load(Ordering::SeqCst), 3, "rejected op must not run");
    }

    #[tokio::test]
    async fn test_unspecified_rule_uses_default() {
        let (_, _, guard) = guard_fixture();

        // "default" is not configured in the fixture; the built-in fallback
        // still admits the call.
        let result = guard.guard(None, "1.2.3.4", || async { "ok" }).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_unknown_rule_fails_before_store_io() {
        let (_, store, guard) = guard_fixture();
        let baseline = store.op_count();

        let err = guard
            .guard(Some("nonexistent_rule"), "1.2.3.4", || async {})
            .await
            .unwrap_err();

        assert!(matches!(err, FloodgateError::Config(_)));
        assert_eq!(store.op_count(), baseline, "config miss must not hit the store");
    }

    #[tokio::test]
    async fn test_store_outage_is_not_a_denial() {
        let (_, store, guard) = guard_fixture();
        store.sever();

        let err = guard
            .guard(Some("login"), "1.2.3.4", || async {})
            .await
            .unwrap_err();
        assert!(matches!(err, FloodgateError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_identities_do_not_share_windows() {
        let (_, _, guard) = guard_fixture();

        for _ in 0..3 {
            guard
                .guard(Some("login"), "1.2.3.4", || async {})
                .await
                .unwrap();
        }
        assert!(guard
            .guard(Some("login"), "1.2.3.4", || async {})
            .await
            .is_err());

        // A different identity still has a fresh window.
        assert!(guard
            .guard(Some("login"), "5.6.7.8", || async {})
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_concrete_login_scenario() {
        // Rule {period: 60s, limit: 3}, identity "1.2.3.4": three attempts
        // inside the first second are admitted, a fourth at t=1.5s is denied
        // with a positive wait hint, and at t=61s the window has capacity
        // again.
        let (clock, _, guard) = guard_fixture();

        for _ in 0..3 {
            clock.advance(Duration::from_millis(300));
            guard
                .guard(Some("login"), "1.2.3.4", || async {})
                .await
                .unwrap();
        }

        clock.advance(Duration::from_millis(600));
        let err = guard
            .guard(Some("login"), "1.2.3.4", || async {})
            .await
            .unwrap_err();
        let wait = err.wait_time().unwrap();
        assert!(wait > 0 && wait <= 60);

        clock.advance(Duration::from_secs(60));
        assert!(guard
            .guard(Some("login"), "1.2.3.4", || async {})
            .await
            .is_ok());
    }
}
