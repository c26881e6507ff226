use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// Accepted shapes for `--start`/`--end` when a lookup needs them as unix
/// seconds. The strings still go to the query API verbatim; only lookups
/// convert.
const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub fn parse_local_timestamp(value: &str) -> Result<i64, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("timestamp is empty".to_string());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.and_utc().timestamp());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp());
        }
    }
    Err(format!(
        "unrecognized timestamp '{trimmed}', expected YYYY-MM-DD[ HH:MM[:SS]]"
    ))
}

pub fn validate_contact_number(value: &str) -> Result<(), String> {
    let pattern = Regex::new(r"^\+?\d{3,15}$").map_err(|e| e.to_string())?;
    if pattern.is_match(value.trim()) {
        Ok(())
    } else {
        Err(format!(
            "invalid contact number '{value}', expected digits only"
        ))
    }
}
