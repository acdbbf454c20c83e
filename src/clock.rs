//! Time sources for window entry timestamps.
//!
//! Window entries are scored by the caller's clock, so the limiter takes its
//! time source through a trait. Production code uses [`SystemClock`]; tests
//! drive [`ManualClock`] to exercise expiry without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds-since-epoch time source.
pub trait Clock: Send + Sync {
    /// Current time in microseconds since the Unix epoch.
    ///
    /// Successive calls must return strictly increasing values, so that two
    /// attempts landing in the same tick never collapse into one window entry.
    fn now_micros(&self) -> u64;
}

/// Wall-clock time source with process-local monotonic tie-breaking.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;

        // Two callers reading the same microsecond get distinct, increasing
        // values; the clock also rides through small wall-clock steps backward.
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}

/// Manually advanced time source for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
    ticks: AtomicU64,
}

impl ManualClock {
    /// Creates a clock pinned at the given microsecond timestamp.
    pub fn new(start_micros: u64) -> Self {
        Self {
            now: AtomicU64::new(start_micros),
            ticks: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        // Each read ticks one microsecond past the set position, keeping
        // reads distinct without ever wrapping; whole-second advances in
        // tests dwarf the drift.
        self.now.load(Ordering::SeqCst) + self.ticks.fetch_add(1, Ordering::SeqCst)
    }
}
