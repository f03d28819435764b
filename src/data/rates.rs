//! Exchange Rates Data API client
//!
//! Fetches the latest rates for a base currency from the APILayer
//! "Exchange Rates Data" API and validates them into a [`FetchedRates`].
//! Each call performs exactly one request; retrying is left to the cache.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use super::{CurrencyCode, FetchedRates, RateTable};

/// Base URL for the Exchange Rates Data API
pub const DEFAULT_BASE_URL: &str = "https://api.apilayer.com/exchangerates_data";

/// Default timeout for a single provider request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while retrieving exchange rates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    /// The provider rejected the API key (HTTP 401)
    #[error("invalid API key, please check your configuration")]
    Unauthorized,

    /// The provider's rate limit was hit (HTTP 429)
    #[error("API rate limit exceeded")]
    RateLimited,

    /// The provider failed on its side (HTTP 5xx)
    #[error("exchange rate server error (HTTP {status})")]
    ServerError { status: u16 },

    /// Any other non-success status, e.g. an unknown base currency
    #[error("request rejected (HTTP {status}): {}", .message.as_deref().unwrap_or("no details"))]
    Rejected {
        status: u16,
        message: Option<String>,
    },

    /// The body was not JSON or had no usable rate table
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// No response was received (connection failure or timeout)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Nothing was fetched and nothing is cached for the requested base
    #[error("no cached exchange rates available")]
    NoCachedData,
}

/// A source of exchange rates for a base currency
///
/// Implemented by [`ExchangeRatesClient`] for the real provider; tests plug in
/// scripted sources.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetches the latest rates for `base` with a single attempt
    async fn fetch(&self, base: &CurrencyCode) -> Result<FetchedRates, RateError>;
}

/// Successful `/latest` response body
#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    rates: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    message: Option<String>,
}

/// Error body the provider sends alongside non-success statuses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the Exchange Rates Data API
#[derive(Debug, Clone)]
pub struct ExchangeRatesClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl ExchangeRatesClient {
    /// Creates a client with the given API key and per-request timeout
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn latest_url(&self) -> String {
        format!("{}/latest", self.base_url.trim_end_matches('/'))
    }

    /// Fetches the latest rates for `base`
    ///
    /// # Returns
    /// * `Ok(FetchedRates)` - validated rates with the provider's base and date
    /// * `Err(RateError)` - the status or body could not be used, or no
    ///   response arrived
    pub async fn fetch_latest(&self, base: &CurrencyCode) -> Result<FetchedRates, RateError> {
        tracing::debug!(base = %base, "requesting latest exchange rates");

        let response = self
            .http_client
            .get(self.latest_url())
            .query(&[("base", base.as_str())])
            .header("apikey", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().await.map_err(network_error)?;

        if let Some(err) = classify_status(status, &text) {
            return Err(err);
        }

        parse_latest(&text, base)
    }
}

#[async_trait]
impl RateSource for ExchangeRatesClient {
    async fn fetch(&self, base: &CurrencyCode) -> Result<FetchedRates, RateError> {
        self.fetch_latest(base).await
    }
}

fn network_error(err: reqwest::Error) -> RateError {
    if err.is_timeout() {
        RateError::NetworkError("request timed out".to_string())
    } else {
        RateError::NetworkError(err.to_string())
    }
}

/// Maps a non-success HTTP status to its error kind
fn classify_status(status: StatusCode, body: &str) -> Option<RateError> {
    if status.is_success() {
        return None;
    }
    let err = match status.as_u16() {
        401 => RateError::Unauthorized,
        429 => RateError::RateLimited,
        code if code >= 500 => RateError::ServerError { status: code },
        code => RateError::Rejected {
            status: code,
            message: serde_json::from_str::<ErrorBody>(body)
                .ok()
                .and_then(|b| b.message),
        },
    };
    Some(err)
}

/// Parses and validates a `/latest` body
///
/// Codes are uppercased, unusable rates are dropped, and the base is pinned
/// at 1.0.
fn parse_latest(body: &str, requested: &CurrencyCode) -> Result<FetchedRates, RateError> {
    let response: LatestResponse = serde_json::from_str(body)
        .map_err(|e| RateError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let raw_rates = response.rates.ok_or_else(|| {
        RateError::MalformedResponse(
            response
                .message
                .unwrap_or_else(|| "missing `rates` field".to_string()),
        )
    })?;

    let base = response
        .base
        .as_deref()
        .and_then(|b| CurrencyCode::parse(b).ok())
        .unwrap_or_else(|| requested.clone());

    let date = response
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

    let mut rates = RateTable::new();
    let mut dropped = 0usize;
    for (code, value) in raw_rates {
        let stored = match (CurrencyCode::parse(&code), value.as_f64()) {
            (Ok(code), Some(rate)) => rates.insert(code, rate),
            _ => false,
        };
        if !stored {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::warn!(base = %base, dropped, "dropped unusable rates from provider response");
    }

    if rates.is_empty() {
        return Err(RateError::MalformedResponse(
            "response contained no usable rates".to_string(),
        ));
    }
    if !rates.contains(&base) {
        rates.insert(base.clone(), 1.0);
    }

    Ok(FetchedRates { base, date, rates })
}
