//! In-process window store.
//!
//! Keeps the same semantics as the Redis backend over a process-local map:
//! per-key ordered entry sets, expiry driven by the injected [`Clock`], and
//! bounded sweep batches. Useful for tests and for single-process hosts that
//! do not need cross-process limiting. Every trait method bumps an operation
//! counter so tests can assert how many store round-trips a code path made.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::error::{FloodgateError, Result};
use crate::store::{SweepPage, WindowStore, SWEEP_CURSOR_START};

/// Entry set plus expiry deadline for one key.
#[derive(Debug, Default)]
struct WindowState {
    entries: BTreeSet<u64>,
    expires_at_micros: u64,
}

/// Process-local [`WindowStore`] implementation.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    keys: DashMap<String, WindowState>,
    ops: AtomicU64,
    sweep_ops: AtomicU64,
    severed: AtomicBool,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            keys: DashMap::new(),
            ops: AtomicU64::new(0),
            sweep_ops: AtomicU64::new(0),
            severed: AtomicBool::new(false),
        }
    }

    /// Total store operations performed.
    pub fn op_count(&self) -> u64 {
        self.ops.load(Ordering::SeqCst)
    }

    /// Sweep batches performed.
    pub fn sweep_batch_count(&self) -> u64 {
        self.sweep_ops.load(Ordering::SeqCst)
    }

    /// Number of keys currently held, expired or not.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Simulates losing the store connection; subsequent operations fail
    /// until [`MemoryStore::restore`] is called.
    pub fn sever(&self) {
        self.severed.store(true, Ordering::SeqCst);
    }

    /// Re-establishes the simulated connection.
    pub fn restore(&self) {
        self.severed.store(false, Ordering::SeqCst);
    }

    fn check_connection(&self) -> Result<()> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        if self.severed.load(Ordering::SeqCst) {
            return Err(FloodgateError::StoreUnavailable(
                "connection severed".to_string(),
            ));
        }
        Ok(())
    }

    /// Drops the key when its expiry deadline has passed, mirroring the
    /// store-side TTL reaper.
    fn expire_if_due(&self, key: &str, now: u64) {
        if let Some(state) = self.keys.get(key) {
            if state.expires_at_micros <= now {
                drop(state);
                self.keys.remove(key);
            }
        }
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn update_window(
        &self,
        key: &str,
        now_micros: u64,
        period: Duration,
        record: bool,
    ) -> Result<u64> {
        self.check_connection()?;
        self.expire_if_due(key, now_micros);

        let period_micros = period.as_micros() as u64;
        let mut state = self.keys.entry(key.to_string()).or_default();

        let cutoff = now_micros.saturating_sub(period_micros);
        let live = state.entries.split_off(&(cutoff + 1));
        state.entries = live;
        if record {
            state.entries.insert(now_micros);
        }
        state.expires_at_micros = now_micros + period_micros;

        let count = state.entries.len() as u64;
        drop(state);

        // A probe on an absent key must not leave an empty window behind.
        if count == 0 {
            self.keys.remove(key);
        }
        Ok(count)
    }

    async fn time_to_live(&self, key: &str) -> Result<u64> {
        self.check_connection()?;
        let now = self.clock.now_micros();
        self.expire_if_due(key, now);

        match self.keys.get(key) {
            Some(state) => {
                let remaining = state.expires_at_micros.saturating_sub(now);
                Ok(remaining.div_ceil(1_000_000))
            }
            None => Ok(0),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_connection()?;
        self.keys.remove(key);
        Ok(())
    }

    async fn sweep_batch(&self, pattern: &str, _cursor: &str, chunk: usize) -> Result<SweepPage> {
        self.check_connection()?;
        self.sweep_ops.fetch_add(1, Ordering::SeqCst);

        let batch: Vec<String> = self
            .keys
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .take(chunk)
            .map(|entry| entry.key().clone())
            .collect();

        for key in &batch {
            self.keys.remove(key);
        }

        // A full page may mean more matches remain; a short page ends the
        // sweep, matching the cursor contract of the Redis backend.
        let cursor = if batch.len() == chunk {
            "1".to_string()
        } else {
            SWEEP_CURSOR_START.to_string()
        };

        Ok(SweepPage {
            cursor,
            deleted: batch.len() as u64,
        })
    }
}

/// Glob matching for key patterns; only `*` is special, matching any run of
/// characters (the subset Redis key patterns use here).
fn glob_match(pattern: &str, key: &str) -> bool {
    fn matches(p: &[u8], k: &[u8]) -> bool {
        match p.first() {
            None => k.is_empty(),
            Some(b'*') => {
                (0..=k.len()).any(|skip| matches(&p[1..], &k[skip..]))
            }
            Some(&c) => k.first() == Some(&c) && matches(&p[1..], &k[1..]),
        }
    }
    matches(pattern.as_bytes(), key.as_bytes())
}
