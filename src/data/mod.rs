//! Core data models for fxconv
//!
//! Currency codes, rate tables and the rates returned by the exchange-rate
//! provider, plus the provider client itself.

pub mod rates;
#[cfg(test)]
pub(crate) mod testing;

pub use rates::{ExchangeRatesClient, RateError, RateSource};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a currency code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyCodeError {
    /// The code was empty after trimming
    #[error("currency code must not be empty")]
    Empty,

    /// The code contained something other than ASCII letters
    #[error("invalid currency code: '{0}'")]
    Invalid(String),
}

/// An uppercase, ISO 4217-like currency code such as `USD` or `EUR`
///
/// Parsing trims whitespace and uppercases the input, so `" eur"` and `"EUR"`
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parses and normalizes a currency code
    pub fn parse(s: &str) -> Result<Self, CurrencyCodeError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CurrencyCodeError::Empty);
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyCodeError::Invalid(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Wraps a code known at compile time to be valid
    pub(crate) fn from_static(code: &'static str) -> Self {
        debug_assert!(Self::parse(code).is_ok_and(|c| c.as_str() == code));
        Self(code.to_string())
    }

    /// Returns the code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Exchange rates relative to a base currency
///
/// Every stored rate is finite and strictly positive. Entries are kept sorted
/// by currency code so listings are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RateTable(BTreeMap<CurrencyCode, f64>);

impl RateTable {
    /// Creates an empty rate table
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a rate, ignoring values that are not finite and positive
    ///
    /// Returns `true` if the rate was stored.
    pub fn insert(&mut self, code: CurrencyCode, rate: f64) -> bool {
        if rate.is_finite() && rate > 0.0 {
            self.0.insert(code, rate);
            true
        } else {
            false
        }
    }

    /// Returns the rate for a currency, if present
    pub fn get(&self, code: &CurrencyCode) -> Option<f64> {
        self.0.get(code).copied()
    }

    /// Returns whether the table holds a rate for the currency
    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.0.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(code, rate)` pairs in code order
    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyCode, f64)> {
        self.0.iter().map(|(code, rate)| (code, *rate))
    }
}

impl FromIterator<(CurrencyCode, f64)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (CurrencyCode, f64)>>(iter: I) -> Self {
        let mut table = RateTable::new();
        for (code, rate) in iter {
            table.insert(code, rate);
        }
        table
    }
}

/// A validated response from the exchange-rate provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedRates {
    /// Base currency echoed back by the provider
    pub base: CurrencyCode,
    /// Date the provider reports for the rates, if it sent a parseable one
    pub date: Option<NaiveDate>,
    /// Rates relative to `base`
    pub rates: RateTable,
}
