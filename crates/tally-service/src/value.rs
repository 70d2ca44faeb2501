//! Parsing and formatting of metric values.
//!
//! The text and JSON ingestion paths both end up here so that a value
//! accepted on one path is formatted identically on the other.

use crate::error::{ServiceError, ServiceResult};

/// Decimal exponents outside `[-4, 6)` are written in scientific notation.
const MIN_PLAIN_EXP: i32 = -4;
const MAX_PLAIN_EXP: i32 = 6;

/// Parse a gauge value. NaN and infinities are rejected.
pub fn parse_gauge(raw: &str) -> ServiceResult<f64> {
    let value: f64 = raw
        .parse()
        .map_err(|_| ServiceError::BadValue(format!("{raw:?} is not a number")))?;
    check_gauge(value)
}

/// Reject gauge values that cannot round-trip through the text formats.
pub fn check_gauge(value: f64) -> ServiceResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ServiceError::BadValue(format!("{value} is not finite")))
    }
}

/// Parse a counter delta as a signed 64-bit decimal integer.
pub fn parse_counter(raw: &str) -> ServiceResult<i64> {
    raw.parse()
        .map_err(|_| ServiceError::BadValue(format!("{raw:?} is not an integer")))
}

/// Shortest decimal string that parses back to exactly `value`.
///
/// Magnitudes in `[1e-4, 1e6)` print as plain decimals (`36.6`, `1`,
/// `123456`); anything else switches to `1e+06` / `1.5e-07` form with at
/// least two exponent digits.
pub fn format_gauge(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let sci = format!("{value:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return value.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return value.to_string();
    };
    if (MIN_PLAIN_EXP..MAX_PLAIN_EXP).contains(&exp) {
        value.to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
    }
}

/// Counters print as plain decimal integers.
pub fn format_counter(value: i64) -> String {
    value.to_string()
}
