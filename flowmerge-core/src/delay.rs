use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, iter::Sum, ops::Add, str::FromStr, time::Duration};
use thiserror::Error;

/// The one-way propagation delay of a link or of a path of links.
///
/// # Precision
///
/// The delay is precise up to the micro seconds. Constructing a
/// [`Delay`] from a [`Duration`] that contains nano seconds
/// precision value will truncate the nano seconds part.
///
/// ```
/// # use flowmerge_core::Delay;
/// # use std::time::Duration;
/// let delay = Delay::new(Duration::from_nanos(987_654_321));
/// assert_eq!(
///     delay.into_duration(),
///     Duration::from_micros(987_654),
/// );
/// ```
///
/// # Serialisation
///
/// Topology documents carry link delays as a number of milliseconds
/// (`"delay": 2.5`). A duration string (`"delay": "2500us"`) is
/// accepted too. A [`Delay`] is always serialised as milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Delay(u64);

#[derive(Debug, Error, PartialEq)]
pub enum DelayError {
    #[error("Delay of {millis}ms is not a finite, non-negative number of milliseconds")]
    Invalid { millis: f64 },
}

impl Delay {
    /// No delay, e.g. between a collector and itself.
    pub const ZERO: Self = Self::new(Duration::ZERO);

    /// Durations beyond [`u64::MAX`] micro seconds saturate.
    #[inline(always)]
    pub const fn new(duration: Duration) -> Self {
        let micros = duration.as_micros();
        if micros > u64::MAX as u128 {
            Self(u64::MAX)
        } else {
            Self(micros as u64)
        }
    }

    /// create a delay from a (possibly fractional) number of milliseconds.
    ///
    /// ```
    /// # use flowmerge_core::Delay;
    /// assert_eq!(Delay::from_millis_f64(2.5).unwrap().as_micros(), 2_500);
    /// assert!(Delay::from_millis_f64(-1.0).is_err());
    /// ```
    pub fn from_millis_f64(millis: f64) -> Result<Self, DelayError> {
        if !millis.is_finite() || millis < 0.0 {
            return Err(DelayError::Invalid { millis });
        }
        Ok(Self((millis * 1_000.0).round() as u64))
    }

    #[inline(always)]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    #[inline(always)]
    pub fn into_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl From<Delay> for Duration {
    fn from(value: Delay) -> Self {
        value.into_duration()
    }
}
impl From<Duration> for Delay {
    fn from(value: Duration) -> Self {
        Self::new(value)
    }
}

impl Add for Delay {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Delay {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dur = crate::time::Duration::new(self.into_duration());
        fmt::Display::fmt(&dur, f)
    }
}

impl FromStr for Delay {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = crate::time::Duration::from_str(s)?;

        Ok(Self::new(duration.into_duration()))
    }
}

impl Serialize for Delay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_millis_f64())
    }
}

impl<'de> Deserialize<'de> for Delay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Millis(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Millis(millis) => Self::from_millis_f64(millis).map_err(serde::de::Error::custom),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
