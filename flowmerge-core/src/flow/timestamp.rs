use crate::defaults::TIMESTAMP_FORMAT;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

const PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A flow timestamp, with microsecond precision.
///
/// Timestamps are naive (no timezone): collectors of a run share the
/// same simulated clock. Internally the value is the number of micro
/// seconds since `1970-01-01T00:00:00`.
///
/// ```
/// # use flowmerge_core::Timestamp;
/// let t: Timestamp = "2020-03-01T10:00:00.250000".parse().unwrap();
/// assert_eq!(t.to_string(), "2020-03-01T10:00:00.250000");
/// assert_eq!(t.shifted(750_000).to_string(), "2020-03-01T10:00:01.000000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

#[derive(Debug, Error)]
pub enum TimestampParseError {
    #[error("Invalid timestamp `{input}': {source}")]
    Format {
        input: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("Timestamp `{input}' is out of range")]
    OutOfRange { input: String },
}

impl Timestamp {
    pub const EPOCH: Self = Self(0);

    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// create a timestamp from a (possibly fractional) number of
    /// milliseconds since the epoch, rounded to the closest microsecond.
    #[inline]
    pub fn from_millis_f64(millis: f64) -> Self {
        Self((millis * 1_000.0).round() as i64)
    }

    #[inline]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Move the timestamp by `micros` (negative values move it back in
    /// time), saturating at the representable bounds.
    #[must_use = "function does not modify the current value"]
    #[inline]
    pub const fn shifted(self, micros: i64) -> Self {
        Self(self.0.saturating_add(micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp_micros(self.0) {
            Some(datetime) => write!(f, "{}", datetime.naive_utc().format(TIMESTAMP_FORMAT)),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let datetime = NaiveDateTime::parse_from_str(s.trim(), PARSE_FORMAT).map_err(|source| {
            TimestampParseError::Format {
                input: s.to_owned(),
                source,
            }
        })?;

        Ok(Self(datetime.and_utc().timestamp_micros()))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Millis(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Millis(millis) if millis.is_finite() => Ok(Self::from_millis_f64(millis)),
            Repr::Millis(millis) => Err(serde::de::Error::custom(
                TimestampParseError::OutOfRange {
                    input: millis.to_string(),
                },
            )),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
