//! Currency conversion math and display formatting.
//!
//! Everything here is pure: the same amount, currencies and rate table always
//! produce the same result.

use serde::Serialize;

use crate::data::{CurrencyCode, RateTable};

/// Magnitude from which values are shown with 2 decimals
const LARGE_THRESHOLD: f64 = 1000.0;

/// Magnitude from which values are shown with 4 decimals (6 below it)
const UNIT_THRESHOLD: f64 = 1.0;

/// A conversion of an amount between two currencies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    /// Converted amount
    pub value: f64,
    /// Units of the target currency per unit of the source currency
    pub unit_rate: f64,
    /// `value` formatted for display
    pub formatted_value: String,
    /// `unit_rate` formatted for display
    pub formatted_rate: String,
}

/// Converts `amount` of `from` into `to` using `rates`.
///
/// A non-finite amount counts as 0. When both currencies are the same, or
/// either one is missing from the table, the conversion is the identity
/// (unit rate 1.0). Otherwise the unit rate is `rates[to] / rates[from]`,
/// which works whatever base the table is relative to.
pub fn convert(
    amount: f64,
    from: &CurrencyCode,
    to: &CurrencyCode,
    rates: &RateTable,
) -> ConversionResult {
    let amount = if amount.is_finite() { amount } else { 0.0 };

    let unit_rate = match (rates.get(from), rates.get(to)) {
        (Some(from_rate), Some(to_rate)) if from != to => to_rate / from_rate,
        _ => 1.0,
    };
    let value = amount * unit_rate;

    ConversionResult {
        value,
        unit_rate,
        formatted_value: format_amount(value),
        formatted_rate: format_amount(unit_rate),
    }
}

/// Number of decimals used to display `x`.
///
/// Decided on the unrounded magnitude: `|x| >= 1000` → 2, `|x| >= 1` → 4,
/// otherwise 6.
pub fn display_precision(x: f64) -> usize {
    let magnitude = x.abs();
    if magnitude >= LARGE_THRESHOLD {
        2
    } else if magnitude >= UNIT_THRESHOLD {
        4
    } else {
        6
    }
}

/// Formats `x` with the tiered precision of [`display_precision`].
pub fn format_amount(x: f64) -> String {
    format!("{:.*}", display_precision(x), x)
}

/// Parses user-entered amount text.
///
/// Empty, unparseable or non-finite input yields 0.
pub fn parse_amount(text: &str) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}
