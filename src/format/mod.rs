// src/format/mod.rs
//
// Display formatting. Every function here is total: unset or unusable input
// yields the configured placeholder, never an error.

pub mod date;
pub mod number;

use crate::config::FormatConfig;
use crate::record::RawValue;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt::Write;

pub use date::{extract_date, parse_date_str};
pub use number::{clean_str, extract_decimal, extract_ratio, parse_decimal_text};

/// Round to `dp` places with the configured mode and render as
/// `(negative, integer digits, fraction digits)`.
fn split_fixed(value: Decimal, dp: u32, cfg: &FormatConfig) -> (bool, String, String) {
    let mut v = value.round_dp_with_strategy(dp, cfg.rounding.strategy());
    v.rescale(dp);
    let negative = v.is_sign_negative() && !v.is_zero();
    let text = v.abs().to_string();
    match text.split_once('.') {
        Some((int, frac)) => (negative, int.to_string(), frac.to_string()),
        None => (negative, text, String::new()),
    }
}

fn join_fixed(int: &str, frac: &str, cfg: &FormatConfig) -> String {
    let grouped = number::group_digits(int, cfg.thousands_separator);
    if frac.is_empty() {
        grouped
    } else {
        format!("{}{}{}", grouped, cfg.decimal_separator, frac)
    }
}

/// `1234.5` → `$1,234.50` with the default config.
pub fn format_currency(value: Option<Decimal>, cfg: &FormatConfig) -> String {
    let Some(value) = value else {
        return cfg.placeholder.clone();
    };
    let (negative, int, frac) = split_fixed(value, 2, cfg);
    let sign = if negative { "-" } else { "" };
    format!("{}{}{}", sign, cfg.currency_symbol, join_fixed(&int, &frac, cfg))
}

/// Ratio → percentage with one decimal, e.g. `0.057` → `5.7%`. Ratios outside
/// `[0, 1]` are clamped; the second element reports whether that happened.
pub fn format_percent_flagged(ratio: Option<Decimal>, cfg: &FormatConfig) -> (String, bool) {
    let Some(ratio) = ratio else {
        return (cfg.placeholder.clone(), false);
    };
    let clamped = ratio.clamp(Decimal::ZERO, Decimal::ONE);
    let capped = clamped != ratio;
    let percent = clamped * Decimal::ONE_HUNDRED;
    let (_, int, frac) = split_fixed(percent, 1, cfg);
    (format!("{}%", join_fixed(&int, &frac, cfg)), capped)
}

pub fn format_percent(ratio: Option<Decimal>, cfg: &FormatConfig) -> String {
    format_percent_flagged(ratio, cfg).0
}

/// Grouped whole number, e.g. housing units or UVI quantities.
pub fn format_number(value: Option<Decimal>, cfg: &FormatConfig) -> String {
    let Some(value) = value else {
        return cfg.placeholder.clone();
    };
    let (negative, int, _) = split_fixed(value, 0, cfg);
    let sign = if negative { "-" } else { "" };
    format!("{}{}", sign, number::group_digits(&int, cfg.thousands_separator))
}

/// Plain integer without grouping; project codes are identifiers, not amounts.
pub fn format_integer(value: Option<Decimal>, cfg: &FormatConfig) -> String {
    match value {
        Some(v) => v.trunc().normalize().to_string(),
        None => cfg.placeholder.clone(),
    }
}

/// An unusable `date_format` yields the placeholder.
pub fn format_naive_date(value: Option<NaiveDate>, cfg: &FormatConfig) -> String {
    let Some(d) = value else {
        return cfg.placeholder.clone();
    };
    let mut out = String::new();
    match write!(out, "{}", d.format(&cfg.date_format)) {
        Ok(()) => out,
        Err(_) => cfg.placeholder.clone(),
    }
}

/// Accepts native dates, ISO/locale date text and spreadsheet serials.
pub fn format_date(value: Option<&RawValue>, cfg: &FormatConfig) -> String {
    format_naive_date(extract_date(value, cfg.day_first).value(), cfg)
}
