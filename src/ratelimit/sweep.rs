//! Bulk reset of limiter state.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::ratelimit::RuleResolver;
use crate::store::{WindowStore, SWEEP_CURSOR_START};

/// Clears limiter state for one identity or for the whole namespace.
///
/// Deletion runs in bounded batches, one server-side round-trip per batch, so
/// a large key space never stalls the store or concurrent callers. Keys
/// created while a sweep is running may survive it; that is acceptable, a
/// subsequent sweep picks them up.
#[derive(Clone)]
pub struct BulkKeyReset {
    store: Arc<dyn WindowStore>,
    resolver: RuleResolver,
    chunk: usize,
}

impl BulkKeyReset {
    /// Creates a sweeper deleting up to `chunk` keys per store round-trip.
    pub fn new(store: Arc<dyn WindowStore>, resolver: RuleResolver, chunk: usize) -> Self {
        Self {
            store,
            resolver,
            chunk: chunk.max(1),
        }
    }

    /// Clears every rule window held for `identity`. Returns the number of
    /// keys deleted.
    pub async fn reset_identity(&self, identity: &str) -> Result<u64> {
        let pattern = self.resolver.identity_pattern(identity);
        let deleted = self.reset_matching(&pattern).await?;
        info!(identity = identity, deleted = deleted, "identity rate limit state cleared");
        Ok(deleted)
    }

    /// Clears all limiter state under the namespace prefix. Returns the
    /// number of keys deleted.
    pub async fn reset_all(&self) -> Result<u64> {
        let pattern = self.resolver.namespace_pattern();
        let deleted = self.reset_matching(&pattern).await?;
        info!(deleted = deleted, "all rate limit state cleared");
        Ok(deleted)
    }

    /// Sweeps `pattern` batch by batch until the cursor wraps around.
    async fn reset_matching(&self, pattern: &str) -> Result<u64> {
        let mut cursor = SWEEP_CURSOR_START.to_string();
        let mut deleted = 0u64;

        loop {
            let page = self.store.sweep_batch(pattern, &cursor, self.chunk).await?;
            deleted += page.deleted;
            debug!(
                pattern = pattern,
                batch_deleted = page.deleted,
                total_deleted = deleted,
                "sweep batch complete"
            );
            if page.is_complete() {
                return Ok(deleted);
            }
            cursor = page.cursor;
        }
    }
}
