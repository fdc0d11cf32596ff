//! Tolerant cell parsing. Every helper maps malformed input to `None`; the
//! pipeline never fails a file over a bad date or price.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

/// Blank-cell test used by the carry-forward logic.
pub fn blank(v: &str) -> bool {
    v.trim().is_empty()
}

/// Parse a date cell across the conventions the chains actually use:
/// ISO date, ISO datetime (truncated at the time separator), slash-delimited
/// day/month/year, and unseparated 8-digit. First matching format wins.
pub fn parse_date(v: &str) -> Option<NaiveDate> {
    let v = v.trim();
    if v.is_empty() {
        return None;
    }
    // "2024-05-01 00:00:00" / "2024-05-01T00:00:00" -> "2024-05-01"
    let date_part = v.split(['T', ' ']).next().unwrap_or(v);

    if let Ok(d) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(date_part, "%d/%m/%Y") {
        return Some(d);
    }
    if date_part.len() == 8 && date_part.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(date_part, "%Y%m%d") {
            return Some(d);
        }
    }
    None
}

pub fn parse_decimal(v: &str) -> Option<BigDecimal> {
    let v = v.trim();
    if v.is_empty() {
        return None;
    }
    BigDecimal::from_str(v).ok()
}

/// Integer cell that is sometimes float-formatted ("3.0"). Truncates.
pub fn parse_int(v: &str) -> Option<i32> {
    let v = v.trim();
    if v.is_empty() {
        return None;
    }
    if let Ok(n) = v.parse::<i32>() {
        return Some(n);
    }
    // Some chains format counts as floats ("2.0"). Values outside i32 would
    // saturate under `as`, so they are rejected instead.
    match v.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= i32::MIN as f64 && f <= i32::MAX as f64 => Some(f as i32),
        _ => None,
    }
}
