use anyhow::{anyhow, bail, ensure, Result};
use core::fmt;
use logos::{Lexer, Logos};
use std::{str::FromStr, time};

/// Human readable duration, e.g. `20ms`, `1s 500ms` or `2.5ms`.
///
/// Values are accumulated with microsecond precision: anything below
/// a microsecond is truncated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub(crate) struct Duration(time::Duration);

impl Duration {
    pub(crate) fn new(dur: time::Duration) -> Self {
        Self(dur)
    }

    #[inline]
    pub fn into_duration(self) -> time::Duration {
        self.0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <time::Duration as fmt::Debug>::fmt(&self.0, f)
    }
}

impl FromStr for Duration {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::new(s);

        let mut micros = 0f64;
        let mut parts = 0usize;

        while let Some(next) = lex.next() {
            let number: Token = next.map_err(|()| anyhow!("Failed to parse: {s}"))?;

            ensure!(
                number == Token::Value,
                "Expecting duration to start with a number. Cannot parse {s}"
            );
            let number: f64 = lex.slice().parse()?;

            let Some(Ok(unit)) = lex.next() else {
                bail!("Expecting a unit, failed to parse: {s}")
            };
            let scale = match unit {
                Token::NanoSeconds => 0.001,
                Token::MicroSeconds => 1.0,
                Token::MilliSeconds => 1_000.0,
                Token::Seconds => 1_000_000.0,
                Token::Minutes => 60_000_000.0,
                Token::Value => bail!("Failed to parse `{s}', expecting a unit."),
            };
            micros += number * scale;
            parts += 1;
        }

        ensure!(parts > 0, "Empty duration");

        Ok(Self(time::Duration::from_micros(micros.trunc() as u64)))
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|µs|μs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexer_splits_value_and_unit() {
        let mut lex = Token::lexer("2.5ms");

        assert_eq!(lex.next(), Some(Ok(Token::Value)));
        assert_eq!(lex.slice(), "2.5");

        assert_eq!(lex.next(), Some(Ok(Token::MilliSeconds)));
        assert_eq!(lex.span(), 3..5);
    }

    #[test]
    fn parse() {
        let Duration(duration) = "20ms".parse().unwrap();
        assert_eq!(duration.as_millis(), 20);

        let Duration(duration) = "1s 500ms".parse().unwrap();
        assert_eq!(duration.as_millis(), 1_500);

        let Duration(duration) = "2.5ms".parse().unwrap();
        assert_eq!(duration.as_micros(), 2_500);
    }

    #[test]
    fn sub_microsecond_truncates() {
        let Duration(duration) = "999ns".parse().unwrap();
        assert_eq!(duration, time::Duration::ZERO);
    }

    #[test]
    fn parse_invalid() {
        assert!("20".parse::<Duration>().is_err());
        assert!("ms".parse::<Duration>().is_err());
        assert!("".parse::<Duration>().is_err());
        assert!("20 parsecs".parse::<Duration>().is_err());
    }
}
