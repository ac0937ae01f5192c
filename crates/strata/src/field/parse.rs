//! Parsing of predicate and configuration literals into field values.

use crate::error::{Result, StrataError};
use crate::field::{Decimal, FieldType, TimeUnit};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, TimeZone};

/// Date-time layouts accepted for timestamp literals, tried in order.
const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Unit suffixes accepted after an integer timestamp literal, longest first.
const UNIT_SUFFIXES: [(&str, TimeUnit); 5] = [
    ("ns", TimeUnit::Nanoseconds),
    ("µs", TimeUnit::Microseconds),
    ("us", TimeUnit::Microseconds),
    ("ms", TimeUnit::Milliseconds),
    ("s", TimeUnit::Seconds),
];

fn parse_error(value: &str, field_type: FieldType, reason: impl Into<String>) -> StrataError {
    StrataError::Parse {
        value: value.to_string(),
        field_type,
        reason: reason.into(),
    }
}

/// Parses an integral literal and checks it against `[min, max]`.
pub(crate) fn parse_integer(value: &str, field_type: FieldType, min: i64, max: i64) -> Result<i64> {
    let parsed: i64 = value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| parse_error(value, field_type, e.to_string()))?;
    if parsed < min || parsed > max {
        return Err(parse_error(
            value,
            field_type,
            format!("out of range [{}, {}]", min, max),
        ));
    }
    Ok(parsed)
}

/// Parses a decimal literal such as `12`, `-0.25`, `1.5e3` or `+7E-2`.
pub(crate) fn parse_decimal(value: &str) -> Result<Decimal> {
    let field_type = FieldType::Decimal;
    let text = value.trim();
    let (number, exponent_part) = match text.find(['e', 'E']) {
        Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
        None => (text, None),
    };

    let (negative, digits) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };
    let (int_digits, frac_digits) = match digits.find('.') {
        Some(pos) => (&digits[..pos], &digits[pos + 1..]),
        None => (digits, ""),
    };
    if int_digits.is_empty() && frac_digits.is_empty() {
        return Err(parse_error(value, field_type, "no digits"));
    }

    // Accumulated with the sign applied so that i64::MIN is reachable.
    let sign = if negative { -1 } else { 1 };
    let mut mantissa: i64 = 0;
    for c in int_digits.chars().chain(frac_digits.chars()) {
        let digit = c
            .to_digit(10)
            .ok_or_else(|| parse_error(value, field_type, format!("unexpected character {:?}", c)))?;
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(sign * digit as i64))
            .ok_or_else(|| parse_error(value, field_type, "too many digits"))?;
    }

    let explicit: i32 = match exponent_part {
        Some(exp) => exp
            .parse()
            .map_err(|e: std::num::ParseIntError| parse_error(value, field_type, e.to_string()))?,
        None => 0,
    };
    let exponent = explicit - frac_digits.len() as i32;
    let exponent = i8::try_from(exponent)
        .map_err(|_| parse_error(value, field_type, format!("exponent {} out of range", exponent)))?;
    Ok(Decimal::new(mantissa, exponent))
}

/// Parses a timestamp literal into a value expressed in `unit`.
///
/// Accepted forms:
/// - a bare integer, already in `unit`;
/// - an integer with a unit suffix (`ns`, `us`/`µs`, `ms`, `s`);
/// - a date (`2024-03-01`) or date-time (`2024-03-01 09:30:00.125`) interpreted in
///   `time_zone`.
pub(crate) fn parse_timestamp(
    value: &str,
    field_type: FieldType,
    unit: TimeUnit,
    time_zone: &FixedOffset,
) -> Result<i64> {
    let text = value.trim();

    if let Ok(raw) = text.parse::<i64>() {
        return Ok(raw);
    }

    for (suffix, suffix_unit) in UNIT_SUFFIXES {
        if let Some(number) = text.strip_suffix(suffix) {
            if let Ok(raw) = number.trim().parse::<i64>() {
                return Ok(unit.convert(raw, suffix_unit));
            }
        }
    }

    let naive = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| parse_error(value, field_type, "not a number or a date/time"))?;

    let nanos = time_zone
        .from_local_datetime(&naive)
        .single()
        .and_then(|dt| dt.timestamp_nanos_opt())
        .ok_or_else(|| parse_error(value, field_type, "date/time out of range"))?;
    Ok(unit.convert(nanos, TimeUnit::Nanoseconds))
}
