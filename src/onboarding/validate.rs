//! Field validators for the three birth details.
//!
//! Both the wizard and the direct-extraction shortcut go through these, so a
//! profile completed either way holds identically normalized values.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date pattern"));
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("static time pattern"));

/// Validate a `YYYY-MM-DD` date that names a real calendar day.
pub fn validate_date(input: &str) -> Option<String> {
    let value = input.trim();
    if !DATE_RE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(value.to_string())
}

/// Validate a 24-hour `HH:MM` time.
pub fn validate_time(input: &str) -> Option<String> {
    let value = input.trim();
    if !TIME_RE.is_match(value) {
        return None;
    }
    let (hour, minute) = value.split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(value.to_string())
}

/// Validate a "City, Country" place. Both sides of the first comma must be
/// non-empty; whitespace around each part is normalized.
pub fn validate_place(input: &str) -> Option<String> {
    let value = input.trim();
    let (locality, region) = value.split_once(',')?;
    if locality.trim().is_empty() || region.trim().is_empty() {
        return None;
    }
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    Some(parts.join(", "))
}
