//! Due-date normalization.
//!
//! The todo service stores naive ISO-8601 timestamps. Accepted inputs:
//! full RFC 3339 (offset kept), `YYYY-MM-DDTHH:MM[:SS[.f]]`, the same with a
//! space separator, and bare `YYYY-MM-DD` (midnight).

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use todoclaw_core::tool::ToolFailure;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Normalize `input` to `YYYY-MM-DDTHH:MM:SS` (plus offset when one was given).
pub fn normalize_due_date(input: &str) -> Result<String, ToolFailure> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(format!("{}T00:00:00", d.format("%Y-%m-%d")));
    }

    Err(ToolFailure::invalid_argument(
        "due_date",
        format!("Invalid date format: '{input}'. Use ISO format like YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD"),
    ))
}
