//! Application state management for fxconv
//!
//! This module contains the converter's user-facing state: the amount and
//! currency selection, the rates currently in use, loading/error flags and the
//! display theme. It drives the rate cache and maps its errors to messages a
//! user can act on.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::cache::{RateCache, RatesSnapshot};
use crate::convert::{convert, parse_amount, ConversionResult};
use crate::data::{CurrencyCode, RateError, RateSource, RateTable};
use crate::refresh::RefreshMessage;

/// Currency pair selected when the store is created
const DEFAULT_FROM: &str = "USD";
const DEFAULT_TO: &str = "EUR";

/// Display theme, independent of everything rate related
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Marks a refresh started by [`ConverterStore::begin_refresh`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    /// From-currency at the time the refresh started
    pub base: CurrencyCode,
    seq: u64,
}

/// Converter state and the rate cache behind it
pub struct ConverterStore<S> {
    /// Amount to convert
    pub amount: f64,
    /// Currency the amount is in
    pub from_currency: CurrencyCode,
    /// Currency to convert into
    pub to_currency: CurrencyCode,
    /// Rates currently used for conversions
    pub rates: Option<RatesSnapshot>,
    /// A refresh is in progress
    pub loading: bool,
    /// User-facing error or warning from the last refresh
    pub error: Option<String>,
    /// When the rates in use were fetched
    pub last_updated: Option<DateTime<Utc>>,
    /// Date the provider reported for the rates in use
    pub rates_date: Option<NaiveDate>,
    /// The rates in use are a fallback after a failed refresh
    pub is_stale: bool,
    /// The from-currency changed since the last applied refresh
    pub needs_refresh: bool,
    /// Current display theme
    pub theme: Theme,
    refresh_seq: u64,
    cache: Arc<RateCache<S>>,
}

impl<S: RateSource + 'static> ConverterStore<S> {
    /// Creates a store converting 1 USD to EUR on top of `cache`
    pub fn new(cache: RateCache<S>) -> Self {
        Self::with_shared_cache(Arc::new(cache))
    }

    /// Creates a store on a cache that is also used elsewhere (e.g. by a
    /// background refresher)
    pub fn with_shared_cache(cache: Arc<RateCache<S>>) -> Self {
        Self {
            amount: 1.0,
            from_currency: CurrencyCode::from_static(DEFAULT_FROM),
            to_currency: CurrencyCode::from_static(DEFAULT_TO),
            rates: None,
            loading: false,
            error: None,
            last_updated: None,
            rates_date: None,
            is_stale: false,
            needs_refresh: true,
            theme: Theme::default(),
            refresh_seq: 0,
            cache,
        }
    }

    /// The cache backing this store
    pub fn cache(&self) -> Arc<RateCache<S>> {
        Arc::clone(&self.cache)
    }

    /// Sets the amount; non-finite values become 0
    pub fn set_amount(&mut self, amount: f64) {
        self.amount = if amount.is_finite() { amount } else { 0.0 };
    }

    /// Sets the amount from user input; empty or invalid text becomes 0
    pub fn set_amount_text(&mut self, text: &str) {
        self.amount = parse_amount(text);
    }

    /// Changes the from-currency, flagging a refresh when it differs
    pub fn set_from_currency(&mut self, currency: CurrencyCode) {
        if currency != self.from_currency {
            self.from_currency = currency;
            self.needs_refresh = true;
        }
    }

    pub fn set_to_currency(&mut self, currency: CurrencyCode) {
        self.to_currency = currency;
    }

    /// Exchanges the from- and to-currency
    pub fn swap_currencies(&mut self) {
        std::mem::swap(&mut self.from_currency, &mut self.to_currency);
        if self.from_currency != self.to_currency {
            self.needs_refresh = true;
        }
    }

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
    }

    /// Marks a refresh for the current from-currency as started
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.refresh_seq += 1;
        self.loading = true;
        self.error = None;
        RefreshTicket {
            base: self.from_currency.clone(),
            seq: self.refresh_seq,
        }
    }

    /// Applies the outcome of the refresh identified by `ticket`
    ///
    /// A result for a from-currency that is no longer selected is discarded.
    /// Errors are recorded as a user-facing message and also returned.
    pub fn finish_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<RatesSnapshot, RateError>,
    ) -> Result<(), RateError> {
        if ticket.seq == self.refresh_seq {
            self.loading = false;
        }
        if ticket.base != self.from_currency {
            tracing::debug!(
                base = %ticket.base,
                current = %self.from_currency,
                "discarding rates for a superseded currency"
            );
            return Ok(());
        }

        match result {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot);
                Ok(())
            }
            Err(err) => {
                tracing::error!(base = %ticket.base, error = %err, "failed to fetch exchange rates");
                self.error = Some(user_message(&err));
                self.is_stale = false;
                Err(err)
            }
        }
    }

    /// Fetches rates for the current from-currency through the cache
    pub async fn refresh_rates(&mut self) -> Result<(), RateError> {
        let ticket = self.begin_refresh();
        let result = self.cache.get_rates(&ticket.base).await;
        self.finish_refresh(ticket, result)
    }

    /// Applies a message from the background refresher
    pub fn apply_refresh_message(&mut self, message: RefreshMessage) {
        match message {
            RefreshMessage::RefreshStarted { base } => {
                if base == self.from_currency {
                    self.loading = true;
                }
            }
            RefreshMessage::RatesUpdated { base, snapshot } => {
                if base == self.from_currency {
                    self.loading = false;
                    self.apply_snapshot(snapshot);
                }
            }
            RefreshMessage::RefreshError { base, error } => {
                if base == self.from_currency {
                    self.loading = false;
                    self.error = Some(user_message(&error));
                    self.is_stale = false;
                }
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: RatesSnapshot) {
        if snapshot.is_stale {
            tracing::warn!(base = %snapshot.entry.base, "using stale exchange rate data");
        }
        self.error = snapshot
            .warning
            .as_ref()
            .map(|w| format!("Using cached data: {}", user_message(w)));
        self.is_stale = snapshot.is_stale;
        self.last_updated = Some(snapshot.entry.fetched_at);
        self.rates_date = snapshot.entry.fetched.date;
        self.needs_refresh = false;
        self.rates = Some(snapshot);
    }

    /// The rates currently in use, or an empty table before the first fetch
    pub fn rate_table(&self) -> &RateTable {
        static EMPTY: RateTable = RateTable::new();
        self.rates.as_ref().map(|s| s.rates()).unwrap_or(&EMPTY)
    }

    /// Converts the current amount with the current selection and rates
    pub fn conversion(&self) -> ConversionResult {
        convert(
            self.amount,
            &self.from_currency,
            &self.to_currency,
            self.rate_table(),
        )
    }
}

/// Maps an error to the message shown to the user
pub fn user_message(err: &RateError) -> String {
    match err {
        RateError::Unauthorized => "Invalid API key. Please check your configuration.".to_string(),
        RateError::RateLimited => {
            "API rate limit exceeded. Please wait a moment and try again.".to_string()
        }
        RateError::ServerError { .. } => "Server error. Please try again later.".to_string(),
        RateError::Rejected { message, .. } => match message {
            Some(message) => format!("The exchange rate service rejected the request: {}", message),
            None => "The exchange rate service rejected the request.".to_string(),
        },
        RateError::MalformedResponse(_) => {
            "Received an unexpected response from the exchange rate service.".to_string()
        }
        RateError::NetworkError(_) => {
            "Could not reach the exchange rate service. Check your connection and try again."
                .to_string()
        }
        RateError::NoCachedData => "Exchange rates are not available yet.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testing::{code, ScriptedSource};
    use std::time::Duration;

    fn usd_rates() -> [(&'static str, f64); 3] {
        [("USD", 1.0), ("EUR", 0.9), ("JPY", 150.0)]
    }

    fn store_with(source: ScriptedSource) -> ConverterStore<ScriptedSource> {
        ConverterStore::new(RateCache::new(source))
    }

    #[test]
    fn test_initial_state() {
        let store = store_with(ScriptedSource::new());
        assert_eq!(store.amount, 1.0);
        assert_eq!(store.from_currency, code("USD"));
        assert_eq!(store.to_currency, code("EUR"));
        assert!(!store.loading);
        assert!(store.error.is_none());
        assert!(store.needs_refresh);
        assert_eq!(store.theme, Theme::Light);
    }

    #[test]
    fn test_conversion_without_rates_is_identity() {
        let mut store = store_with(ScriptedSource::new());
        store.set_amount(12.0);
        let result = store.conversion();
        assert_eq!(result.formatted_value, "12.0000");
        assert_eq!(result.unit_rate, 1.0);
    }

    #[tokio::test]
    async fn test_refresh_then_convert() {
        let mut store = store_with(ScriptedSource::new().then_ok("USD", &usd_rates()));
        store.set_amount(10.0);

        store.refresh_rates().await.unwrap();
        let result = store.conversion();

        assert!(!store.loading);
        assert!(!store.is_stale);
        assert!(!store.needs_refresh);
        assert!(store.last_updated.is_some());
        assert_eq!(result.formatted_value, "9.0000");
        assert_eq!(result.formatted_rate, "0.900000");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_sets_message_and_clears_loading() {
        let mut store = store_with(
            ScriptedSource::new()
                .then_err(RateError::RateLimited)
                .then_err(RateError::RateLimited)
                .then_err(RateError::RateLimited),
        );

        let err = store.refresh_rates().await.unwrap_err();

        assert_eq!(err, RateError::RateLimited);
        assert!(!store.loading);
        assert!(!store.is_stale);
        let message = store.error.as_deref().unwrap();
        assert!(message.contains("rate limit"));
        assert!(message.contains("wait"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_sets_warning_without_failing() {
        let cache = RateCache::new(
            ScriptedSource::new()
                .then_ok("USD", &usd_rates())
                .then_err(RateError::ServerError { status: 500 })
                .then_err(RateError::ServerError { status: 500 })
                .then_err(RateError::ServerError { status: 500 }),
        )
        .with_ttl(Duration::from_secs(60));
        let mut store = ConverterStore::new(cache);

        store.refresh_rates().await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        store.refresh_rates().await.unwrap();

        assert!(store.is_stale);
        assert!(store.error.as_deref().unwrap().starts_with("Using cached data"));
        assert_eq!(store.conversion().formatted_rate, "0.900000");
    }

    #[test]
    fn test_swap_currencies() {
        let mut store = store_with(ScriptedSource::new());
        store.needs_refresh = false;

        store.swap_currencies();

        assert_eq!(store.from_currency, code("EUR"));
        assert_eq!(store.to_currency, code("USD"));
        assert!(store.needs_refresh);
    }

    #[tokio::test]
    async fn test_swap_inverts_conversion() {
        let mut store = store_with(
            ScriptedSource::new()
                .then_ok("USD", &usd_rates())
                .then_ok("JPY", &[("JPY", 1.0), ("USD", 1.0 / 150.0), ("EUR", 0.9 / 150.0)]),
        );
        store.set_to_currency(code("JPY"));
        store.refresh_rates().await.unwrap();
        assert_eq!(store.conversion().formatted_rate, "150.0000");

        store.swap_currencies();
        store.refresh_rates().await.unwrap();
        assert_eq!(store.conversion().formatted_rate, "0.006667");
    }

    #[test]
    fn test_set_from_currency_flags_refresh_only_on_change() {
        let mut store = store_with(ScriptedSource::new());
        store.needs_refresh = false;

        store.set_from_currency(code("USD"));
        assert!(!store.needs_refresh);

        store.set_from_currency(code("GBP"));
        assert!(store.needs_refresh);
    }

    #[test]
    fn test_set_amount_text() {
        let mut store = store_with(ScriptedSource::new());
        store.set_amount_text("42.5");
        assert_eq!(store.amount, 42.5);
        store.set_amount_text("");
        assert_eq!(store.amount, 0.0);
        store.set_amount_text("abc");
        assert_eq!(store.amount, 0.0);
        store.set_amount(f64::NAN);
        assert_eq!(store.amount, 0.0);
    }

    #[test]
    fn test_toggle_theme_leaves_rates_alone() {
        let mut store = store_with(ScriptedSource::new());
        store.toggle_theme();
        assert_eq!(store.theme, Theme::Dark);
        assert!(store.rates.is_none());
        store.toggle_theme();
        assert_eq!(store.theme, Theme::Light);
    }

    #[tokio::test]
    async fn test_result_for_superseded_currency_is_discarded() {
        let mut store = store_with(
            ScriptedSource::new()
                .then_ok("USD", &usd_rates())
                .then_ok("GBP", &[("GBP", 1.0), ("EUR", 1.2)]),
        );

        let ticket = store.begin_refresh();
        store.set_from_currency(code("GBP"));
        let result = store.cache().get_rates(&ticket.base).await;
        store.finish_refresh(ticket, result).unwrap();

        assert!(store.rates.is_none());
        assert!(store.needs_refresh);
        assert!(!store.loading);

        store.refresh_rates().await.unwrap();
        assert_eq!(store.conversion().formatted_rate, "1.2000");
    }

    #[tokio::test]
    async fn test_earlier_ticket_does_not_clear_newer_loading() {
        let mut store = store_with(ScriptedSource::new().then_ok("USD", &usd_rates()));

        let first = store.begin_refresh();
        let _second = store.begin_refresh();
        let result = store.cache().get_rates(&first.base).await;
        store.finish_refresh(first, result).unwrap();

        assert!(store.loading);
        assert!(store.rates.is_some());
    }

    #[tokio::test]
    async fn test_apply_refresh_message() {
        let mut store = store_with(ScriptedSource::new().then_ok("USD", &usd_rates()));
        let snapshot = store.cache().get_rates(&code("USD")).await.unwrap();

        store.apply_refresh_message(RefreshMessage::RefreshStarted { base: code("USD") });
        assert!(store.loading);

        store.apply_refresh_message(RefreshMessage::RatesUpdated {
            base: code("USD"),
            snapshot,
        });
        assert!(!store.loading);
        assert!(store.rates.is_some());

        store.apply_refresh_message(RefreshMessage::RefreshError {
            base: code("CHF"),
            error: RateError::Unauthorized,
        });
        assert!(store.error.is_none());

        store.apply_refresh_message(RefreshMessage::RefreshError {
            base: code("USD"),
            error: RateError::Unauthorized,
        });
        assert_eq!(
            store.error.as_deref(),
            Some("Invalid API key. Please check your configuration.")
        );
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let errors = [
            RateError::Unauthorized,
            RateError::RateLimited,
            RateError::ServerError { status: 500 },
            RateError::Rejected {
                status: 400,
                message: None,
            },
            RateError::MalformedResponse("x".to_string()),
            RateError::NetworkError("x".to_string()),
            RateError::NoCachedData,
        ];
        let messages: Vec<String> = errors.iter().map(user_message).collect();

        for (i, m1) in messages.iter().enumerate() {
            for (j, m2) in messages.iter().enumerate() {
                if i != j {
                    assert_ne!(m1, m2);
                }
            }
        }
    }
}
