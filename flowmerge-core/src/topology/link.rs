use crate::delay::Delay;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Unique identifier of the link between two nodes
///
/// The link is bidirectional and is unique for two node. I.e.
/// For all nodes `n1` and `n2` the identifier `(n1, n2)` is the
/// same as the identifier `(n2, n1)`.
///
/// ```
/// # use flowmerge_core::topology::LinkId;
/// assert_eq!(LinkId::new(("a", "b")), LinkId::new(("b", "a")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId {
    smaller: String,
    larger: String,
}

impl LinkId {
    pub fn new((a, b): (&str, &str)) -> Self {
        let (smaller, larger) = if a < b { (a, b) } else { (b, a) };
        Self {
            smaller: smaller.to_owned(),
            larger: larger.to_owned(),
        }
    }

    /// get the node names that compose this link identifier
    ///
    /// # Note
    ///
    /// The names may come back in a different order than the one
    /// used at construction.
    #[inline]
    pub fn nodes(&self) -> (&str, &str) {
        (&self.smaller, &self.larger)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.smaller, self.larger)
    }
}

/// Nominal capacity of a link as written in the topology document
/// (`"100Mb"`, `"1000Mbps"`, `100`).
///
/// Only the leading number is kept: it is used to prefer the widest
/// link when deriving routes. A value without a leading number ranks
/// as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Bandwidth(u64);

impl Bandwidth {
    pub const fn new(rank: u64) -> Self {
        Self(rank)
    }

    fn from_text(text: &str) -> Self {
        let digits = text
            .trim()
            .bytes()
            .take_while(u8::is_ascii_digit)
            .fold(0u64, |acc, digit| {
                acc.saturating_mul(10).saturating_add(u64::from(digit - b'0'))
            });
        Self(digits)
    }
}

impl<'de> Deserialize<'de> for Bandwidth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Number(rank) => Self(rank),
            Repr::Text(text) => Self::from_text(&text),
        })
    }
}

/// An undirected link of the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    delay: Delay,
    bandwidth: Bandwidth,
}

impl Link {
    pub fn new(delay: Delay, bandwidth: Bandwidth) -> Self {
        Self { delay, bandwidth }
    }

    /// one-way propagation delay of the link, identical in both directions.
    pub fn delay(&self) -> Delay {
        self.delay
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ab_eq_ba() {
        assert_eq!(
            LinkId::new(("server1", "router")),
            // ==
            LinkId::new(("router", "server1")),
        );
        assert_eq!(LinkId::new(("b", "a")).nodes(), ("a", "b"));
    }

    #[test]
    fn bandwidth_leading_number() {
        let parse = |s: &str| serde_json::from_str::<Bandwidth>(s).unwrap();

        assert_eq!(parse("\"100Mb\""), Bandwidth::new(100));
        assert_eq!(parse("\"1000Mbps\""), Bandwidth::new(1_000));
        assert_eq!(parse("10"), Bandwidth::new(10));
        assert_eq!(parse("\"fast\""), Bandwidth::new(0));
        assert!(parse("\"100Mb\"") < parse("\"1000Mb\""));
    }
}
