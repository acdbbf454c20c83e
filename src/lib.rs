//! Floodgate - Distributed Sliding-Window Rate Limiting
//!
//! This crate implements request-rate admission control backed by a shared
//! Redis store. Window maintenance is atomic under concurrent callers across
//! process boundaries, rejected attempts still consume quota, and limiter
//! state can be bulk-reset without stalling the store.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
