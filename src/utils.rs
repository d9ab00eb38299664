use std::fmt::Display;

use chrono::{DateTime, TimeZone};

/// Display format used for every date shown in a notification: `07:45PM, 10-19-26`.
pub const DATE_FORMAT: &str = "%I:%M%p, %m-%d-%y";

/// Formats a point in time as a 12-hour clock with AM/PM followed by `MM-DD-YY`.
pub fn format_datetime<Tz>(dt: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    dt.format(DATE_FORMAT).to_string()
}

/// Rounds `value` to `places` decimal places, halves away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Formats a number with `,` thousands separators and a fixed number of decimals.
///
/// `1234567.891` with 2 decimals becomes `1,234,567.89`.
pub fn format_thousands(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Formats a token amount (or any other plain quantity): whole values keep one
/// decimal (`5.0`), everything else is trimmed to at most 3 decimals (`7.7`).
pub fn format_amount(value: f64) -> String {
    let rounded = round_to(value, 3);
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        format!("{rounded}")
    }
}

/// Formats a value exactly as it was read, keeping one decimal on whole
/// numbers (`5.0`) but never rounding (`42.12345`).
pub fn format_reading(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Formats an optional market figure, falling back to `N/A` when the API omitted it.
pub fn format_optional(value: Option<f64>, f: impl Fn(f64) -> String) -> String {
    value.map_or_else(|| "N/A".to_string(), f)
}
