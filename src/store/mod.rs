//! Backing store abstraction for window state.
//!
//! All limiter state lives in a shared store offering ordered-set semantics,
//! per-key expiry, and atomic multi-step updates. [`RedisStore`] is the
//! production backend; [`MemoryStore`] is an in-process backend used by tests
//! and single-process hosts.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Cursor value marking the start (and end) of a sweep.
pub const SWEEP_CURSOR_START: &str = "0";

/// One page of a pattern-delete sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPage {
    /// Cursor to pass to the next batch; [`SWEEP_CURSOR_START`] when done.
    pub cursor: String,
    /// Keys deleted by this batch.
    pub deleted: u64,
}

impl SweepPage {
    /// Whether the sweep has visited the whole key space.
    pub fn is_complete(&self) -> bool {
        self.cursor == SWEEP_CURSOR_START
    }
}

/// Store operations the limiter relies on.
///
/// Each method is one store round-trip, and `update_window` in particular must
/// execute its remove/insert/expire/count sequence as a single atomic unit
/// under arbitrary concurrent callers across process boundaries. The limiter
/// never performs check-then-act across two separate round-trips.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Atomically maintains the window behind `key` and returns the live
    /// entry count.
    ///
    /// The unit of work: drop entries older than `now − period`, insert an
    /// entry scored `now_micros` when `record` is set, refresh the key's
    /// expiry to `period`, count what remains. The count includes the entry
    /// just inserted.
    async fn update_window(
        &self,
        key: &str,
        now_micros: u64,
        period: Duration,
        record: bool,
    ) -> Result<u64>;

    /// Remaining time-to-live for `key` in whole seconds; 0 when the key does
    /// not exist or carries no expiry.
    async fn time_to_live(&self, key: &str) -> Result<u64>;

    /// Unconditionally deletes `key`. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Deletes one bounded batch of keys matching `pattern`, starting at
    /// `cursor` (see [`SWEEP_CURSOR_START`]).
    ///
    /// Scanning and deleting a batch happens server-side as one unit, so keys
    /// seen by the scan are fully gone when the call returns. `chunk` bounds
    /// the batch so a large key space never stalls the store.
    async fn sweep_batch(&self, pattern: &str, cursor: &str, chunk: usize) -> Result<SweepPage>;
}
