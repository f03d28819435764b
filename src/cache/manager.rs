//! In-memory cache of the most recently fetched rate table
//!
//! Provides a `RateCache` that serves the current table while it is fresh,
//! refetches through a [`RateSource`] with retry when it is not, and degrades
//! to the previous table (flagged stale) when every attempt fails.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use super::retry::{fetch_with_retry, RetryPolicy};
use crate::data::{CurrencyCode, FetchedRates, RateError, RateSource, RateTable};

/// How long a fetched table is served without refetching
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<CacheEntry>, RateError>>>;

/// A rate table as it was stored in the cache
#[derive(Debug)]
pub struct CacheEntry {
    /// Base currency the table was requested for (the cache key)
    pub base: CurrencyCode,
    /// The provider's validated response
    pub fetched: FetchedRates,
    /// When the table was fetched
    pub fetched_at: DateTime<Utc>,
    stored_at: Instant,
}

impl CacheEntry {
    fn new(base: CurrencyCode, fetched: FetchedRates) -> Self {
        Self {
            base,
            fetched,
            fetched_at: Utc::now(),
            stored_at: Instant::now(),
        }
    }

    /// The cached rates
    pub fn rates(&self) -> &RateTable {
        &self.fetched.rates
    }

    /// Time since the entry was stored
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    fn is_fresh_for(&self, base: &CurrencyCode, ttl: Duration) -> bool {
        &self.base == base && self.age() < ttl
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub struct RatesSnapshot {
    /// The entry being served
    pub entry: Arc<CacheEntry>,
    /// Whether the entry is served in place of a failed refresh
    pub is_stale: bool,
    /// The error that forced the stale fallback, if any
    pub warning: Option<RateError>,
}

impl RatesSnapshot {
    fn fresh(entry: Arc<CacheEntry>) -> Self {
        Self {
            entry,
            is_stale: false,
            warning: None,
        }
    }

    pub fn rates(&self) -> &RateTable {
        self.entry.rates()
    }
}

struct InFlight {
    base: CurrencyCode,
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    entry: Option<Arc<CacheEntry>>,
    in_flight: Option<InFlight>,
    /// Bumped each time a new fetch starts; only the newest fetch may store
    generation: u64,
    last_error: Option<RateError>,
}

/// Caches the rate table for a single base currency at a time
///
/// Lookups for a fresh base return the stored `Arc` without touching the
/// network. Otherwise one fetch (with retries) is started and every concurrent
/// caller asking for the same base awaits that same fetch. A fetch that
/// finishes after a fetch for another base was started is handed to its
/// callers but never stored.
pub struct RateCache<S> {
    source: Arc<S>,
    policy: RetryPolicy,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl<S: RateSource + 'static> RateCache<S> {
    /// Creates an empty cache with the default TTL and retry policy
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            policy: RetryPolicy::default(),
            ttl: DEFAULT_TTL,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The underlying rate source
    pub fn source(&self) -> &S {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns rates for `base`, fetching them if the cache cannot serve them
    ///
    /// # Returns
    /// * `Ok(RatesSnapshot)` with `is_stale = false` for a cache hit or a
    ///   successful fetch
    /// * `Ok(RatesSnapshot)` with `is_stale = true` when every attempt failed
    ///   but an earlier table exists (whatever its age or base)
    /// * `Err(RateError)` with the last attempt's error when nothing is cached
    pub async fn get_rates(&self, base: &CurrencyCode) -> Result<RatesSnapshot, RateError> {
        self.lookup(base, false).await
    }

    /// Fetches rates for `base` even if the cached entry is still fresh
    ///
    /// Joins a fetch already in flight for `base` instead of starting another
    /// one. Failures fall back to the previous entry exactly like
    /// [`get_rates`](Self::get_rates).
    pub async fn refresh(&self, base: &CurrencyCode) -> Result<RatesSnapshot, RateError> {
        self.lookup(base, true).await
    }

    async fn lookup(&self, base: &CurrencyCode, force: bool) -> Result<RatesSnapshot, RateError> {
        let (generation, fetch) = {
            let mut state = self.lock();

            if let Some(entry) = &state.entry {
                if !force && entry.is_fresh_for(base, self.ttl) {
                    tracing::debug!(base = %base, "serving cached rates");
                    return Ok(RatesSnapshot::fresh(Arc::clone(entry)));
                }
            }

            match &state.in_flight {
                Some(in_flight) if &in_flight.base == base => {
                    tracing::debug!(base = %base, "joining in-flight fetch");
                    (in_flight.generation, in_flight.fetch.clone())
                }
                _ => {
                    state.generation += 1;
                    let generation = state.generation;
                    let fetch = self.start_fetch(base.clone());
                    state.in_flight = Some(InFlight {
                        base: base.clone(),
                        generation,
                        fetch: fetch.clone(),
                    });
                    (generation, fetch)
                }
            }
        };

        let outcome = fetch.await;

        let mut state = self.lock();
        if state
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            state.in_flight = None;
        }
        let is_latest = state.generation == generation;

        match outcome {
            Ok(entry) => {
                if is_latest {
                    let already_stored = state
                        .entry
                        .as_ref()
                        .is_some_and(|current| Arc::ptr_eq(current, &entry));
                    if !already_stored {
                        tracing::debug!(base = %base, rates = entry.rates().len(), "stored fresh rates");
                        state.entry = Some(Arc::clone(&entry));
                    }
                    state.last_error = None;
                } else {
                    tracing::debug!(base = %base, "discarding rates from superseded fetch");
                }
                Ok(RatesSnapshot::fresh(entry))
            }
            Err(err) => {
                if is_latest {
                    state.last_error = Some(err.clone());
                }
                match &state.entry {
                    Some(previous) => {
                        tracing::warn!(
                            base = %base,
                            cached_base = %previous.base,
                            error = %err,
                            "using potentially stale cached rates"
                        );
                        Ok(RatesSnapshot {
                            entry: Arc::clone(previous),
                            is_stale: true,
                            warning: Some(err),
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    fn start_fetch(&self, base: CurrencyCode) -> SharedFetch {
        let source = Arc::clone(&self.source);
        let policy = self.policy;
        async move {
            let fetched = fetch_with_retry(source.as_ref(), &base, policy).await?;
            Ok(Arc::new(CacheEntry::new(base, fetched)))
        }
        .boxed()
        .shared()
    }

    /// Returns whatever is cached for `base` without going to the network
    ///
    /// The snapshot is marked stale when the entry has outlived the TTL.
    pub fn cached(&self, base: &CurrencyCode) -> Result<RatesSnapshot, RateError> {
        let state = self.lock();
        match &state.entry {
            Some(entry) if &entry.base == base => Ok(RatesSnapshot {
                entry: Arc::clone(entry),
                is_stale: !entry.is_fresh_for(base, self.ttl),
                warning: state.last_error.clone(),
            }),
            _ => Err(RateError::NoCachedData),
        }
    }

    /// Error from the most recent refresh, cleared by the next success
    pub fn last_error(&self) -> Option<RateError> {
        self.lock().last_error.clone()
    }

    /// Drops the cached entry so the next lookup fetches
    pub fn invalidate(&self) {
        self.lock().entry = None;
    }
}
