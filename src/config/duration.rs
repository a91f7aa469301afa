//! Go-style duration strings
//!
//! The configuration file expresses intervals as `<n><unit>` segments, for
//! example `15s`, `500ms` or `1m30s`. Units: `ms`, `s`, `m`, `h`.

use std::time::Duration;
use serde::Serializer;

use crate::config::types::InvalidValue;

/// Units accepted in the configuration file
const UNITS: [&str; 4] = ["ms", "s", "m", "h"];

/// Parse a duration string such as `1m30s`
///
/// Parsing is done by `humantime`; this only narrows its grammar to unit
/// suffixes from [`UNITS`] with no whitespace between segments.
pub fn parse_duration(input: &str) -> Result<Duration, InvalidValue> {
    let s = input.trim();
    if s.is_empty() {
        return Err(InvalidValue::new("empty duration"));
    }
    if s.contains(char::is_whitespace) {
        return Err(InvalidValue::new(format!("unexpected whitespace in duration '{}'", input)));
    }

    if let Some(unit) = s
        .split(|c: char| c.is_ascii_digit())
        .find(|unit| !unit.is_empty() && !UNITS.contains(unit))
    {
        return Err(InvalidValue::new(format!(
            "unknown unit '{}' in duration '{}' (expected ms, s, m or h)",
            unit, input
        )));
    }

    humantime::parse_duration(s)
        .map_err(|e| InvalidValue::new(format!("invalid duration '{}': {}", input, e)))
}

/// Render a duration in the shortest unit that represents it exactly
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() != 0 || d.as_secs() == 0 {
        return format!("{}ms", d.as_millis());
    }

    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Serde helper writing a duration as a string
pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}
