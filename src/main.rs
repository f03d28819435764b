//! fxconv - Convert currencies with live exchange rates
//!
//! A command-line currency converter. Rates come from the Exchange Rates Data
//! API, are cached for a short time and fall back to the last good copy when
//! the provider is unavailable.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use fxconv::app::{user_message, ConverterStore};
use fxconv::cache::RateCache;
use fxconv::cli::{Cli, Command};
use fxconv::config::Config;
use fxconv::convert::format_amount;
use fxconv::data::{CurrencyCode, RateSource};
use fxconv::refresh::{RefreshConfig, RefreshHandle, RefreshMessage};

/// Sets up logging to stderr, filtered by `RUST_LOG` (warnings by default)
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fxconv=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Prints the current conversion of the store, plus any warning
fn print_conversion<S: RateSource + 'static>(store: &ConverterStore<S>) {
    let result = store.conversion();
    println!(
        "{} {} = {} {}",
        store.amount, store.from_currency, result.formatted_value, store.to_currency
    );
    println!(
        "1 {} = {} {}",
        store.from_currency, result.formatted_rate, store.to_currency
    );
    if let Some(date) = store.rates_date {
        println!("Rates as of {}", date);
    }
    if let Some(warning) = &store.error {
        eprintln!("Warning: {}", warning);
    }
}

async fn run_convert<S: RateSource + 'static>(
    cache: RateCache<S>,
    amount: f64,
    from: CurrencyCode,
    to: CurrencyCode,
) -> Result<()> {
    let mut store = ConverterStore::new(cache);
    store.set_amount(amount);
    store.set_from_currency(from);
    store.set_to_currency(to);

    if let Err(err) = store.refresh_rates().await {
        bail!("{} ({})", user_message(&err), err);
    }
    if !store.rate_table().contains(&store.to_currency) {
        bail!(
            "No exchange rate for {} with base {}",
            store.to_currency,
            store.from_currency
        );
    }

    print_conversion(&store);
    Ok(())
}

async fn run_rates<S: RateSource + 'static>(
    cache: RateCache<S>,
    base: CurrencyCode,
    json: bool,
) -> Result<()> {
    let snapshot = match cache.get_rates(&base).await {
        Ok(snapshot) => snapshot,
        Err(err) => bail!("{} ({})", user_message(&err), err),
    };

    if json {
        let body = serde_json::to_string_pretty(&snapshot.entry.fetched)
            .context("failed to serialize rates")?;
        println!("{}", body);
    } else {
        match snapshot.entry.fetched.date {
            Some(date) => println!("Rates for 1 {} as of {}", snapshot.entry.base, date),
            None => println!("Rates for 1 {}", snapshot.entry.base),
        }
        for (code, rate) in snapshot.rates().iter() {
            println!("{:<4} {:>18}", code, format_amount(rate));
        }
    }

    if let Some(warning) = &snapshot.warning {
        eprintln!("Warning: Using cached data: {}", user_message(warning));
    }
    Ok(())
}

async fn run_watch<S: RateSource + 'static>(
    cache: RateCache<S>,
    amount: f64,
    from: CurrencyCode,
    to: CurrencyCode,
    interval: Option<Duration>,
) -> Result<()> {
    let cache = Arc::new(cache);
    let config = RefreshConfig {
        interval: interval.unwrap_or_else(|| cache.ttl()),
        enabled: true,
    };

    let mut store = ConverterStore::with_shared_cache(Arc::clone(&cache));
    store.set_amount(amount);
    store.set_from_currency(from.clone());
    store.set_to_currency(to);

    let mut handle = RefreshHandle::spawn(cache, from, config);

    loop {
        tokio::select! {
            message = handle.recv() => {
                let Some(message) = message else { break };
                let report = !matches!(message, RefreshMessage::RefreshStarted { .. });
                store.apply_refresh_message(message);
                if report {
                    if store.rates.is_some() {
                        print_conversion(&store);
                    } else if let Some(error) = &store.error {
                        eprintln!("Error: {}", error);
                    }
                    println!();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted, stopping watch");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the key may come from the environment
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_cli(&cli)?;
    tracing::debug!(?config, "starting");
    let cache = config.rate_cache()?;

    match cli.command {
        Command::Convert { amount, from, to } => run_convert(cache, amount, from, to).await,
        Command::Rates { base, json } => run_rates(cache, base, json).await,
        Command::Watch {
            amount,
            from,
            to,
            interval,
        } => run_watch(cache, amount, from, to, interval.map(Duration::from_secs)).await,
    }
}
