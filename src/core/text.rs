//! Text encoding of numbers in sidecar documents.
//!
//! Doubles use the shortest representation that parses back to the same
//! bits, so a save/load cycle is lossless.

use crate::util::{Error, Result};

/// Format a double so that parsing it yields the same value.
#[inline]
pub fn format_f64(value: f64) -> String {
    format!("{value:?}")
}

/// Format a list of doubles as comma-separated text.
pub fn format_f64_list(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_f64(*v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a double, naming `element` in the error.
pub fn parse_f64(element: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| Error::invalid_value(element, text))
}

/// Parse a signed 64-bit integer.
pub fn parse_i64(element: &str, text: &str) -> Result<i64> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| Error::invalid_value(element, text))
}

/// Parse an unsigned 64-bit integer.
pub fn parse_u64(element: &str, text: &str) -> Result<u64> {
    text.trim()
        .parse::<u64>()
        .map_err(|_| Error::invalid_value(element, text))
}

/// Parse a 0/1 style flag; any non-zero integer and boolean words are accepted.
pub fn parse_flag(element: &str, text: &str) -> Result<bool> {
    let t = text.trim();
    if let Ok(n) = t.parse::<i64>() {
        return Ok(n != 0);
    }
    crate::util::parse_bool(t).ok_or_else(|| Error::invalid_value(element, text))
}

/// Encode a flag the way sidecar documents store it.
#[inline]
pub fn format_flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Parse a separator-delimited list of doubles.
pub fn parse_f64_list(element: &str, text: &str, separators: &[char]) -> Result<Vec<f64>> {
    text.split(|c| separators.contains(&c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_f64(element, s))
        .collect()
}
