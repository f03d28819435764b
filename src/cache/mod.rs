//! Cache module for exchange-rate tables
//!
//! This module provides a rate cache that keeps the most recently fetched table
//! in memory for a configurable TTL, retries failed fetches with exponential
//! backoff, and falls back to the previous table (flagged stale) when the
//! provider stays unavailable.

mod manager;
mod retry;

pub use manager::{CacheEntry, RateCache, RatesSnapshot, DEFAULT_TTL};
pub use retry::{fetch_with_retry, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
