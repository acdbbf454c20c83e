//! Redis-backed window store using atomic Lua scripts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{FloodgateError, Result};
use crate::store::{SweepPage, WindowStore};

/// Embedded Lua script for atomic window maintenance.
const WINDOW_SCRIPT: &str = include_str!("scripts/window.lua");

/// Embedded Lua script for one batch of a pattern-delete sweep.
const SWEEP_SCRIPT: &str = include_str!("scripts/sweep.lua");

/// Script SHAs for Lua scripts loaded in Redis.
///
/// These are derived state tied to the current connection: a reconnect to a
/// different Redis instance invalidates them, which surfaces as a NOSCRIPT
/// error and triggers a reload.
#[derive(Clone, Default)]
struct ScriptShas {
    window: String,
    sweep: String,
}

/// Window store backed by Redis sorted sets.
///
/// Construct once at process start and share across callers; the client is
/// safe for concurrent use and each script invocation is independently atomic.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    scripts: Arc<RwLock<ScriptShas>>,
}

impl RedisStore {
    /// Wraps an existing connected client.
    ///
    /// Call [`RedisStore::init`] afterwards to load the Lua scripts.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            scripts: Arc::new(RwLock::new(ScriptShas::default())),
        }
    }

    /// Connects to Redis and loads the Lua scripts.
    pub async fn connect(url: &str) -> Result<Self> {
        let config = Config::from_url(url)
            .map_err(|e| FloodgateError::Config(format!("invalid store url: {e}")))?;
        let client = Client::new(config, None, None, None);
        client.connect();
        client
            .wait_for_connect()
            .await
            .map_err(|e| store_error("connect", e))?;

        info!(url = %url, "Connected to Redis");

        let store = Self::new(client);
        store.init().await?;
        Ok(store)
    }

    /// Loads the Lua scripts into Redis. Must run before the first operation.
    pub async fn init(&self) -> Result<()> {
        self.load_scripts().await
    }

    /// Loads or reloads Lua scripts, caching their SHAs.
    async fn load_scripts(&self) -> Result<()> {
        let window: String = self
            .client
            .script_load(WINDOW_SCRIPT)
            .await
            .map_err(|e| store_error("script_load", e))?;
        let sweep: String = self
            .client
            .script_load(SWEEP_SCRIPT)
            .await
            .map_err(|e| store_error("script_load", e))?;

        info!(window_sha = %window, sweep_sha = %sweep, "Lua scripts loaded into Redis");

        let mut scripts = self.scripts.write().await;
        scripts.window = window;
        scripts.sweep = sweep;
        Ok(())
    }

    /// Whether an error means the script is missing server-side (flushed
    /// script cache, failover to a fresh instance).
    fn is_noscript_error(error: &Error) -> bool {
        error.to_string().contains("NOSCRIPT")
    }

    async fn window_sha(&self) -> String {
        self.scripts.read().await.window.clone()
    }

    async fn sweep_sha(&self) -> String {
        self.scripts.read().await.sweep.clone()
    }
}

/// Maps a client error to the store-unavailable variant, logging the cause.
fn store_error(op: &str, e: Error) -> FloodgateError {
    warn!(op = op, error = %e, "Redis operation failed");
    FloodgateError::StoreUnavailable(e.to_string())
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn update_window(
        &self,
        key: &str,
        now_micros: u64,
        period: Duration,
        record: bool,
    ) -> Result<u64> {
        let args = vec![
            now_micros.to_string(),
            period.as_secs().to_string(),
            if record { "1" } else { "0" }.to_string(),
        ];

        let sha = self.window_sha().await;
        let result: std::result::Result<i64, _> =
            self.client.evalsha(&sha, vec![key], args.clone()).await;

        let count = match result {
            Ok(count) => count,
            Err(e) if Self::is_noscript_error(&e) => {
                warn!("NOSCRIPT from window script, reloading Lua scripts");
                self.load_scripts().await?;

                let sha = self.window_sha().await;
                self.client
                    .evalsha(&sha, vec![key], args)
                    .await
                    .map_err(|e| store_error("update_window", e))?
            }
            Err(e) => return Err(store_error("update_window", e)),
        };

        Ok(count.max(0) as u64)
    }

    async fn time_to_live(&self, key: &str) -> Result<u64> {
        // TTL returns -2 for a missing key and -1 for a key without expiry;
        // both mean the identity is not currently constrained.
        let ttl: i64 = self
            .client
            .ttl(key)
            .await
            .map_err(|e| store_error("time_to_live", e))?;
        Ok(ttl.max(0) as u64)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.client
            .del::<u64, _>(key)
            .await
            .map_err(|e| store_error("remove", e))?;
        Ok(())
    }

    async fn sweep_batch(&self, pattern: &str, cursor: &str, chunk: usize) -> Result<SweepPage> {
        let args = vec![cursor.to_string(), pattern.to_string(), chunk.to_string()];

        let sha = self.sweep_sha().await;
        let result: std::result::Result<(String, u64), _> = self
            .client
            .evalsha(&sha, Vec::<String>::new(), args.clone())
            .await;

        let (next_cursor, deleted) = match result {
            Ok(page) => page,
            Err(e) if Self::is_noscript_error(&e) => {
                warn!("NOSCRIPT from sweep script, reloading Lua scripts");
                self.load_scripts().await?;

                let sha = self.sweep_sha().await;
                self.client
                    .evalsha(&sha, Vec::<String>::new(), args)
                    .await
                    .map_err(|e| store_error("sweep_batch", e))?
            }
            Err(e) => return Err(store_error("sweep_batch", e)),
        };

        Ok(SweepPage {
            cursor: next_cursor,
            deleted,
        })
    }
}
