//! Background rate refresh system
//!
//! Keeps the rate cache warm from a background task, refreshing on an interval
//! and on request, and reports results to the application over tokio channels.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::cache::{RateCache, RatesSnapshot, DEFAULT_TTL};
use crate::data::{CurrencyCode, RateError, RateSource};

/// Messages sent from background refresh to main app
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// A refresh for `base` started
    RefreshStarted { base: CurrencyCode },
    /// Rates are available for `base` (possibly stale)
    RatesUpdated {
        base: CurrencyCode,
        snapshot: RatesSnapshot,
    },
    /// The refresh failed and nothing was cached to fall back on
    RefreshError { base: CurrencyCode, error: RateError },
}

/// Configuration for the refresh interval
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between automatic refreshes
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TTL,
            enabled: true,
        }
    }
}

/// What woke the refresh task
enum Trigger {
    Scheduled,
    Requested,
    BaseChanged,
    Shutdown,
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    refresh_tx: mpsc::Sender<()>,
    base_tx: watch::Sender<CurrencyCode>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Spawns a task that refreshes rates for `base` through `cache`
    ///
    /// The first refresh happens immediately, then every `config.interval`.
    /// With `enabled = false` no task is started and no messages arrive.
    pub fn spawn<S>(cache: Arc<RateCache<S>>, base: CurrencyCode, config: RefreshConfig) -> Self
    where
        S: RateSource + 'static,
    {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (base_tx, mut base_rx) = watch::channel(base);

        if config.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately
                interval.tick().await;
                let mut force = false;

                loop {
                    let base = base_rx.borrow_and_update().clone();
                    if !refresh_once(&cache, &base, force, &msg_tx).await {
                        // Receiver dropped
                        break;
                    }

                    let trigger = tokio::select! {
                        _ = interval.tick() => Trigger::Scheduled,
                        Some(()) = refresh_rx.recv() => Trigger::Requested,
                        Ok(()) = base_rx.changed() => Trigger::BaseChanged,
                        _ = shutdown_rx.recv() => Trigger::Shutdown,
                    };
                    force = match trigger {
                        // A scheduled refresh always fetches; the entry it
                        // would hit is about one interval old
                        Trigger::Scheduled => true,
                        Trigger::Requested => false,
                        Trigger::BaseChanged => {
                            interval.reset();
                            false
                        }
                        Trigger::Shutdown => break,
                    };
                }
                tracing::debug!("background refresh stopped");
            });
        }

        Self {
            receiver: msg_rx,
            refresh_tx,
            base_tx,
            shutdown_tx,
        }
    }

    /// Requests an immediate refresh
    pub async fn request_refresh(&self) {
        let _ = self.refresh_tx.send(()).await;
    }

    /// Switches the refreshed base currency and refreshes right away
    pub fn change_base(&self, base: CurrencyCode) {
        self.base_tx.send_if_modified(|current| {
            if *current == base {
                false
            } else {
                *current = base;
                true
            }
        });
    }

    /// Waits for the next refresh message
    pub async fn recv(&mut self) -> Option<RefreshMessage> {
        self.receiver.recv().await
    }

    /// Shuts down the background refresh task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Runs one refresh and reports it; returns `false` once nobody is listening
///
/// With `force` the cache refetches even if its entry is still fresh.
async fn refresh_once<S>(
    cache: &RateCache<S>,
    base: &CurrencyCode,
    force: bool,
    tx: &mpsc::Sender<RefreshMessage>,
) -> bool
where
    S: RateSource + 'static,
{
    let started = RefreshMessage::RefreshStarted { base: base.clone() };
    if tx.send(started).await.is_err() {
        return false;
    }

    let result = if force {
        cache.refresh(base).await
    } else {
        cache.get_rates(base).await
    };
    let message = match result {
        Ok(snapshot) => RefreshMessage::RatesUpdated {
            base: base.clone(),
            snapshot,
        },
        Err(error) => RefreshMessage::RefreshError {
            base: base.clone(),
            error,
        },
    };
    tx.send(message).await.is_ok()
}

/// Checks for pending refresh messages without blocking
///
/// # Arguments
/// * `handle` - The RefreshHandle to check
///
/// # Returns
/// * `Some(RefreshMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}
