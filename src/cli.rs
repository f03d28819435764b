//! Command-line interface parsing for fxconv
//!
//! This module handles parsing of CLI arguments using clap: the `convert`,
//! `rates` and `watch` commands plus the provider and cache settings shared by
//! all of them.

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::cache::DEFAULT_MAX_ATTEMPTS;
use crate::data::rates::DEFAULT_BASE_URL;
use crate::data::{CurrencyCode, CurrencyCodeError};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The amount is not a finite number
    #[error("Invalid amount: '{0}'. Expected a number such as 10 or 12.50")]
    InvalidAmount(String),

    /// The currency code could not be parsed
    #[error(transparent)]
    InvalidCurrency(#[from] CurrencyCodeError),
}

/// fxconv - Convert currencies with live exchange rates
#[derive(Parser, Debug)]
#[command(name = "fxconv")]
#[command(about = "Currency conversion with live, briefly cached exchange rates")]
#[command(version)]
pub struct Cli {
    /// API key for the Exchange Rates Data API
    #[arg(long, env = "EXCHANGE_RATE_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Root URL of the exchange rate API
    #[arg(long, env = "EXCHANGE_RATE_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Timeout for a single request, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 10, global = true)]
    pub timeout: u64,

    /// Fetch attempts before falling back to cached rates
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ATTEMPTS, global = true)]
    pub attempts: u32,

    /// Delay after the first failed attempt, doubled after each further one
    #[arg(long, value_name = "MS", default_value_t = 1000, global = true)]
    pub retry_delay_ms: u64,

    /// How long fetched rates are reused, in minutes
    #[arg(long, value_name = "MINUTES", default_value_t = 30, global = true)]
    pub ttl: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert an amount from one currency to another
    ///
    /// Example:
    ///   fxconv convert 10 usd eur
    Convert {
        /// Amount to convert
        #[arg(allow_hyphen_values = true, value_parser = parse_amount_arg)]
        amount: f64,
        /// Currency to convert from
        #[arg(value_parser = parse_currency_arg)]
        from: CurrencyCode,
        /// Currency to convert to
        #[arg(value_parser = parse_currency_arg)]
        to: CurrencyCode,
    },

    /// List the latest rates for a base currency
    Rates {
        /// Base currency
        #[arg(default_value = "USD", value_parser = parse_currency_arg)]
        base: CurrencyCode,
        /// Print the rates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep converting as rates refresh in the background (Ctrl-C to stop)
    Watch {
        /// Amount to convert
        #[arg(allow_hyphen_values = true, value_parser = parse_amount_arg)]
        amount: f64,
        /// Currency to convert from
        #[arg(value_parser = parse_currency_arg)]
        from: CurrencyCode,
        /// Currency to convert to
        #[arg(value_parser = parse_currency_arg)]
        to: CurrencyCode,
        /// Seconds between refreshes (defaults to the cache TTL)
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

/// Parses an amount argument into a finite number.
///
/// # Arguments
/// * `s` - The amount string from CLI
///
/// # Returns
/// * `Ok(f64)` if the string is a finite number
/// * `Err(CliError::InvalidAmount)` otherwise
pub fn parse_amount_arg(s: &str) -> Result<f64, CliError> {
    match s.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CliError::InvalidAmount(s.to_string())),
    }
}

/// Parses a currency argument such as `eur` into a [`CurrencyCode`].
pub fn parse_currency_arg(s: &str) -> Result<CurrencyCode, CliError> {
    Ok(CurrencyCode::parse(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_arg() {
        assert_eq!(parse_amount_arg("10").unwrap(), 10.0);
        assert_eq!(parse_amount_arg("12.50").unwrap(), 12.5);
        assert_eq!(parse_amount_arg("-3").unwrap(), -3.0);
    }

    #[test]
    fn test_parse_amount_arg_invalid() {
        let err = parse_amount_arg("ten").unwrap_err();
        assert!(err.to_string().contains("Invalid amount"));
        assert!(err.to_string().contains("ten"));
        assert!(parse_amount_arg("NaN").is_err());
        assert!(parse_amount_arg("inf").is_err());
    }

    #[test]
    fn test_parse_currency_arg() {
        assert_eq!(parse_currency_arg("eur").unwrap().as_str(), "EUR");
        assert!(matches!(
            parse_currency_arg("E1R"),
            Err(CliError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn test_cli_parse_convert() {
        let cli = Cli::parse_from(["fxconv", "convert", "10", "usd", "jpy"]);
        match cli.command {
            Command::Convert { amount, from, to } => {
                assert_eq!(amount, 10.0);
                assert_eq!(from.as_str(), "USD");
                assert_eq!(to.as_str(), "JPY");
            }
            other => panic!("expected convert, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_negative_amount() {
        let cli = Cli::parse_from(["fxconv", "convert", "-5", "usd", "eur"]);
        assert!(matches!(cli.command, Command::Convert { amount, .. } if amount == -5.0));
    }

    #[test]
    fn test_cli_parse_rates_defaults_to_usd() {
        let cli = Cli::parse_from(["fxconv", "rates"]);
        match cli.command {
            Command::Rates { base, json } => {
                assert_eq!(base.as_str(), "USD");
                assert!(!json);
            }
            other => panic!("expected rates, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_global_settings_after_subcommand() {
        let cli = Cli::parse_from([
            "fxconv",
            "rates",
            "eur",
            "--json",
            "--attempts",
            "5",
            "--ttl",
            "1",
            "--retry-delay-ms",
            "250",
        ]);
        assert_eq!(cli.attempts, 5);
        assert_eq!(cli.ttl, 1);
        assert_eq!(cli.retry_delay_ms, 250);
        assert!(matches!(cli.command, Command::Rates { json: true, .. }));
    }

    #[test]
    fn test_cli_parse_watch_interval() {
        let cli = Cli::parse_from(["fxconv", "watch", "1", "usd", "eur", "--interval", "60"]);
        assert!(matches!(
            cli.command,
            Command::Watch {
                interval: Some(60),
                ..
            }
        ));
    }

    #[test]
    fn test_cli_rejects_zero_interval() {
        let result = Cli::try_parse_from(["fxconv", "watch", "1", "usd", "eur", "--interval", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_invalid_currency() {
        let result = Cli::try_parse_from(["fxconv", "convert", "1", "usd", "e1r"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["fxconv"]).is_err());
    }
}
