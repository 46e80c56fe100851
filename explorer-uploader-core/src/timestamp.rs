//! Timestamp parsing for manifest fields.
//!
//! The score computer writes ISO-8601 timestamps with an explicit offset and
//! optional fractional seconds, e.g. `2024-05-01T00:00:00Z` or
//! `2024-05-01T12:30:45.123456+0000`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use thiserror::Error;

const DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_TIME_OFFSET: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// Fractional seconds carry at most microsecond precision.
const MAX_FRACTION_DIGITS: usize = 6;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("invalid timestamp {0:?}: expected YYYY-MM-DDTHH:MM:SS[.ffffff]<offset>")]
    Shape(String),
    #[error("invalid timestamp {input:?}: {source}")]
    Parse {
        input: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Parses `YYYY-MM-DDTHH:MM:SS[.f]<offset>`, where offset is `Z`, `+HH:MM` or `+HHMM`
/// and the optional fraction has one to six digits.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimestampError> {
    if !has_expected_shape(s) {
        return Err(TimestampError::Shape(s.to_string()));
    }
    let parse_err = |source| TimestampError::Parse {
        input: s.to_string(),
        source,
    };
    if let Some(local) = s.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(local, DATE_TIME)
            .map(|ts| ts.and_utc())
            .map_err(parse_err);
    }
    DateTime::<FixedOffset>::parse_from_str(s, DATE_TIME_OFFSET)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(parse_err)
}

/// Checks the parts chrono is lenient about: the `T` separator and the fraction width.
fn has_expected_shape(s: &str) -> bool {
    if s.as_bytes().get(10) != Some(&b'T') {
        return false;
    }
    let Some(rest) = s.get(19..) else {
        return false;
    };
    match rest.strip_prefix('.') {
        Some(fraction) => {
            let digits = fraction.bytes().take_while(u8::is_ascii_digit).count();
            (1..=MAX_FRACTION_DIGITS).contains(&digits)
        }
        None => true,
    }
}

/// Milliseconds since the Unix epoch, rounded to the nearest millisecond.
pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    let nanos = i64::from(ts.timestamp_subsec_nanos());
    ts.timestamp() * 1000 + (nanos + 500_000) / 1_000_000
}
