//! Timestamp helpers.
//!
//! Every stored message or schedule time is rendered as UTC with millisecond
//! precision so that plain string comparison orders them chronologically.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Current time in the canonical stored form.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Re-render an RFC 3339 timestamp in the canonical stored form.
///
/// Returns `None` when the input does not parse.
pub fn normalize(ts: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// The canonical timestamp one millisecond after `ts`.
pub fn next_millisecond(ts: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .and_then(|t| t.with_timezone(&Utc).checked_add_signed(Duration::milliseconds(1)))
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}
