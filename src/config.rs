//! Startup configuration for fxconv
//!
//! Turns parsed CLI arguments (with their environment fallbacks) into a
//! validated [`Config`]. A missing API key is a startup error, never a
//! runtime one.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{RateCache, RetryPolicy};
use crate::cli::Cli;
use crate::data::ExchangeRatesClient;

/// Errors that prevent the application from starting
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No API key was supplied
    #[error(
        "Exchange Rate API key is not set. Set EXCHANGE_RATE_API_KEY (for example in a .env file) \
         or pass --api-key. Get a free API key from: https://apilayer.com/marketplace/exchangerates_data-api"
    )]
    MissingApiKey,

    /// At least one fetch attempt is needed
    #[error("--attempts must be at least 1")]
    NoAttempts,

    /// A zero timeout would fail every request
    #[error("--timeout must be greater than zero")]
    ZeroTimeout,

    /// The HTTP client could not be created
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Validated settings for the provider client and the rate cache
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub ttl: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Config {
    /// Creates a Config from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(Config)` with the validated settings
    /// * `Err(ConfigError)` if the API key is missing or a setting is unusable
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let api_key = cli
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?
            .to_string();

        if cli.attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if cli.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(Config {
            api_key,
            base_url: cli.base_url.clone(),
            request_timeout: Duration::from_secs(cli.timeout),
            retry: RetryPolicy::new(cli.attempts, Duration::from_millis(cli.retry_delay_ms)),
            ttl: Duration::from_secs(cli.ttl.saturating_mul(60)),
        })
    }

    /// Builds the provider client described by this config
    pub fn client(&self) -> Result<ExchangeRatesClient, ConfigError> {
        let client = ExchangeRatesClient::new(self.api_key.clone(), self.request_timeout)?
            .with_base_url(self.base_url.clone());
        Ok(client)
    }

    /// Builds an empty rate cache in front of the provider client
    pub fn rate_cache(&self) -> Result<RateCache<ExchangeRatesClient>, ConfigError> {
        Ok(RateCache::new(self.client()?)
            .with_policy(self.retry)
            .with_ttl(self.ttl))
    }
}
