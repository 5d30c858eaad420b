//! Durations in the compact `1h2m3.5s` form the kubelet accepts for flags like
//! `--eviction-soft-grace-period`.
//!
//! A duration is a sequence of decimal fragments, each followed by one of the
//! units `h`, `m`, `s`, `ms`, `us` (or `µs`) and `ns`. Fragments may carry a
//! fraction (`1.5s`) and are summed up. Durations are never negative.
//!
//! [`Duration`] prints in the same form the kubelet prints its own durations,
//! e.g. `1h0m0s`, `1m30s` or `1.5s`.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, de};
use snafu::{OptionExt, Snafu, ensure};

const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

// Fraction digits past this are worth less than a nanosecond and get ignored
const MAX_FRACTION_DIGITS: usize = 13;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(module)]
pub enum DurationParseError {
    #[snafu(display("duration cannot be empty"))]
    Empty,

    #[snafu(display("unexpected character {chr:?}, expected a number"))]
    UnexpectedCharacter { chr: char },

    #[snafu(display("invalid number {number:?}"))]
    InvalidNumber { number: String },

    #[snafu(display("value {value} is not followed by a unit"))]
    MissingUnit { value: String },

    #[snafu(display("unknown unit {unit:?}, expected one of h, m, s, ms, us or ns"))]
    UnknownUnit { unit: String },

    #[snafu(display("duration is too large"))]
    Overflow,
}

/// A non-negative duration with nanosecond precision.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(std::time::Duration);

impl FromStr for Duration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use duration_parse_error::*;

        let mut rest = s.trim();
        ensure!(!rest.is_empty(), EmptySnafu);

        if rest == "0" {
            return Ok(Self(std::time::Duration::ZERO));
        }

        let mut nanos: u64 = 0;

        while let Some(chr) = rest.chars().next() {
            let number_len = rest
                .find(|c: char| !is_number_char(c))
                .unwrap_or(rest.len());
            ensure!(number_len > 0, UnexpectedCharacterSnafu { chr });

            let number = &rest[..number_len];
            rest = &rest[number_len..];

            let unit_len = rest.find(is_number_char).unwrap_or(rest.len());
            ensure!(unit_len > 0, MissingUnitSnafu { value: number });

            let unit = &rest[..unit_len];
            let unit = unit
                .parse::<DurationUnit>()
                .ok()
                .context(UnknownUnitSnafu { unit })?;
            rest = &rest[unit_len..];

            nanos = fragment_nanos(number, unit)?
                .checked_add(nanos)
                .context(OverflowSnafu)?;
        }

        Ok(Self(std::time::Duration::from_nanos(nanos)))
    }
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

/// The length of a single `<number><unit>` fragment in nanoseconds, with any
/// fraction truncated to whole nanoseconds.
fn fragment_nanos(number: &str, unit: DurationUnit) -> Result<u64, DurationParseError> {
    use duration_parse_error::*;

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    ensure!(
        !fraction.contains('.') && !(whole.is_empty() && fraction.is_empty()),
        InvalidNumberSnafu { number }
    );

    let whole = match whole {
        "" => 0,
        digits => digits.parse::<u64>().ok().context(OverflowSnafu)?,
    };

    let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    let fraction = match digits {
        "" => 0,
        digits => digits.parse::<u128>().ok().context(OverflowSnafu)?,
    };

    let unit_nanos = unit.nanos();
    let nanos = u128::from(whole) * unit_nanos
        + fraction * unit_nanos / 10u128.pow(digits.len() as u32);

    u64::try_from(nanos).ok().context(OverflowSnafu)
}

impl Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nanos = self.0.as_nanos();

        if nanos == 0 {
            return f.write_str("0s");
        }

        if nanos < NANOS_PER_SECOND {
            let (scale, unit) = match nanos {
                ..=999 => (1, "ns"),
                ..=999_999 => (1_000, "µs"),
                _ => (1_000_000, "ms"),
            };
            write_scaled(f, nanos, scale)?;
            return f.write_str(unit);
        }

        let hours = nanos / NANOS_PER_HOUR;
        let minutes = nanos % NANOS_PER_HOUR / NANOS_PER_MINUTE;

        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || minutes > 0 {
            write!(f, "{minutes}m")?;
        }

        write_scaled(f, nanos % NANOS_PER_MINUTE, NANOS_PER_SECOND)?;
        f.write_str("s")
    }
}

/// Writes `value / scale` as a decimal without trailing zeros. `scale` is a
/// power of ten.
fn write_scaled(f: &mut std::fmt::Formatter<'_>, value: u128, scale: u128) -> std::fmt::Result {
    write!(f, "{}", value / scale)?;

    let remainder = value % scale;
    if remainder > 0 {
        let width = scale.ilog10() as usize;
        let fraction = format!("{remainder:0width$}");
        write!(f, ".{}", fraction.trim_end_matches('0'))?;
    }

    Ok(())
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Self(value)
    }
}

/// The units a [`Duration`] fragment can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum DurationUnit {
    #[strum(serialize = "h")]
    Hours,

    #[strum(serialize = "m")]
    Minutes,

    #[strum(serialize = "s")]
    Seconds,

    #[strum(serialize = "ms")]
    Milliseconds,

    // Micro sign and greek mu both show up in the wild
    #[strum(to_string = "µs", serialize = "μs", serialize = "us")]
    Microseconds,

    #[strum(serialize = "ns")]
    Nanoseconds,
}

impl DurationUnit {
    fn nanos(self) -> u128 {
        match self {
            Self::Hours => NANOS_PER_HOUR,
            Self::Minutes => NANOS_PER_MINUTE,
            Self::Seconds => NANOS_PER_SECOND,
            Self::Milliseconds => 1_000_000,
            Self::Microseconds => 1_000,
            Self::Nanoseconds => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn millis(millis: u64) -> Duration {
        Duration::from(std::time::Duration::from_millis(millis))
    }

    #[rstest]
    #[case("1h2m3s", 3_723_000)]
    #[case("90s", 90_000)]
    #[case("2s500ms", 2_500)]
    #[case(" 5m ", 300_000)]
    #[case("0s", 0)]
    #[case("0", 0)]
    #[case("1.5s", 1_500)]
    #[case(".5m", 30_000)]
    #[case("1.s", 1_000)]
    #[case("1.25h", 4_500_000)]
    #[case("2s1h", 3_602_000)]
    #[case("1m1m", 120_000)]
    #[case("1500000us", 1_500)]
    #[case("1000000µs", 1_000)]
    #[case("3000000000ns", 3_000)]
    fn parse(#[case] input: &str, #[case] expected: u64) {
        let duration: Duration = input.parse().unwrap();
        assert_eq!(duration, millis(expected));
    }

    #[test]
    fn parse_truncates_to_nanoseconds() {
        let duration: Duration = "1.0000000019s".parse().unwrap();
        assert_eq!(
            duration,
            Duration::from(std::time::Duration::from_nanos(1_000_000_001))
        );
    }

    #[rstest]
    #[case("", DurationParseError::Empty)]
    #[case("1d", DurationParseError::UnknownUnit { unit: "d".into() })]
    #[case("1s-", DurationParseError::UnknownUnit { unit: "s-".into() })]
    #[case("2m2", DurationParseError::MissingUnit { value: "2".into() })]
    #[case("-1s", DurationParseError::UnexpectedCharacter { chr: '-' })]
    #[case("m", DurationParseError::UnexpectedCharacter { chr: 'm' })]
    #[case(".s", DurationParseError::InvalidNumber { number: ".".into() })]
    #[case("1.2.3s", DurationParseError::InvalidNumber { number: "1.2.3".into() })]
    #[case("9999999999999h", DurationParseError::Overflow)]
    #[case("99999999999999999999s", DurationParseError::Overflow)]
    fn parse_invalid(#[case] input: &str, #[case] expected: DurationParseError) {
        assert_eq!(Duration::from_str(input), Err(expected));
    }

    #[rstest]
    #[case("90s", "1m30s")]
    #[case("70m", "1h10m0s")]
    #[case("1h", "1h0m0s")]
    #[case("1500ms", "1.5s")]
    #[case("2.5ms", "2.5ms")]
    #[case("1500ns", "1.5µs")]
    #[case("7ns", "7ns")]
    #[case("0ms", "0s")]
    fn display(#[case] input: &str, #[case] expected: &str) {
        let duration: Duration = input.parse().unwrap();
        assert_eq!(duration.to_string(), expected);
    }

    #[rstest]
    #[case("1m30s")]
    #[case("1.5s")]
    fn deserialize(#[case] input: &str) {
        let duration: Duration = serde_yaml::from_str(input).unwrap();
        assert_eq!(duration, input.parse().unwrap());
    }
}
