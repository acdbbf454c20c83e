//! Error types for the Floodgate rate limiter.

use thiserror::Error;

/// Main error type for Floodgate operations.
///
/// Hosts are expected to map [`FloodgateError::RateLimitExceeded`] to a
/// 4xx-class response and the remaining variants to 5xx-class responses (or a
/// fail-open bypass, at their discretion). The deny outcome is deliberately a
/// distinct variant so it can never be confused with a store outage.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// A named rule was requested but is not defined.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backing store could not be reached or returned a protocol error.
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(String),

    /// The request was denied; retry once `wait_time` seconds have elapsed.
    #[error("rate limit exceeded, retry in {wait_time}s")]
    RateLimitExceeded {
        /// Whole seconds until the window is expected to admit a new attempt.
        wait_time: u64,
    },

    /// I/O errors (configuration file reads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FloodgateError {
    /// Returns the retry-after hint carried by a denial, if this is one.
    pub fn wait_time(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { wait_time } => Some(*wait_time),
            _ => None,
        }
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
