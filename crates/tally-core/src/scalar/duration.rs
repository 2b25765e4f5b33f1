use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const NANOSECOND: u64 = 1;
const MICROSECOND: u64 = 1_000 * NANOSECOND;
const MILLISECOND: u64 = 1_000 * MICROSECOND;
const SECOND: u64 = 1_000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

/// A signed span of time with nanosecond resolution.
///
/// Text form is a sequence of decimal magnitudes with unit suffixes, e.g.
/// `30s`, `500ms`, `1h30m`, `-1.5h`. Valid units are `ns`, `us` (or `µs`),
/// `ms`, `s`, `m` and `h`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    /// The zero duration.
    pub const ZERO: Self = Self(0);

    /// Creates a duration from nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a duration from milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * MILLISECOND as i64)
    }

    /// Creates a duration from seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * SECOND as i64)
    }

    /// Creates a duration from minutes.
    pub const fn from_mins(mins: i64) -> Self {
        Self(mins * MINUTE as i64)
    }

    /// Total length in nanoseconds.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Converts to a [`std::time::Duration`], or `None` when negative.
    pub fn to_std(self) -> Option<std::time::Duration> {
        u64::try_from(self.0).ok().map(std::time::Duration::from_nanos)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Self(i64::try_from(value.as_nanos()).unwrap_or(i64::MAX))
    }
}

/// Error returned when text is not a valid duration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDurationError {
    #[error("invalid duration '{0}'")]
    Invalid(String),

    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),

    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit { unit: String, input: String },

    #[error("duration '{0}' overflows")]
    Overflow(String),
}

fn unit_nanos(unit: &str) -> Option<u64> {
    Some(match unit {
        "ns" => NANOSECOND,
        "us" | "µs" | "μs" => MICROSECOND,
        "ms" => MILLISECOND,
        "s" => SECOND,
        "m" => MINUTE,
        "h" => HOUR,
        _ => return None,
    })
}

impl FromStr for Duration {
    type Err = ParseDurationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDurationError::Invalid(input.to_string());
        let overflow = || ParseDurationError::Overflow(input.to_string());

        let (negative, mut rest) = match input.as_bytes().first() {
            Some(b'-') => (true, &input[1..]),
            Some(b'+') => (false, &input[1..]),
            _ => (false, input),
        };
        if rest == "0" {
            return Ok(Self::ZERO);
        }
        if rest.is_empty() {
            return Err(invalid());
        }

        let mut total: u64 = 0;
        while !rest.is_empty() {
            let (whole, after) = split_digits(rest);
            let mut fraction = "";
            rest = after;
            if let Some(after_dot) = rest.strip_prefix('.') {
                let (digits, after) = split_digits(after_dot);
                fraction = digits;
                rest = after;
            }
            if whole.is_empty() && fraction.is_empty() {
                return Err(invalid());
            }

            let unit_len = rest
                .find(|c: char| c == '.' || c.is_ascii_digit())
                .unwrap_or(rest.len());
            if unit_len == 0 {
                return Err(ParseDurationError::MissingUnit(input.to_string()));
            }
            let unit = &rest[..unit_len];
            rest = &rest[unit_len..];
            let scale = unit_nanos(unit).ok_or_else(|| ParseDurationError::UnknownUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })?;

            let whole: u64 = if whole.is_empty() {
                0
            } else {
                whole.parse().map_err(|_| overflow())?
            };
            let mut value = whole.checked_mul(scale).ok_or_else(overflow)?;
            value = value
                .checked_add(scale_fraction(fraction, scale))
                .ok_or_else(overflow)?;
            total = total.checked_add(value).ok_or_else(overflow)?;
        }

        if negative {
            if total > i64::MAX as u64 + 1 {
                return Err(overflow());
            }
            Ok(Self((total as i128).wrapping_neg() as i64))
        } else {
            i64::try_from(total).map(Self).map_err(|_| overflow())
        }
    }
}

fn split_digits(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text.split_at(end)
}

/// Scales `0.<fraction>` by `scale`, truncating below one nanosecond.
fn scale_fraction(fraction: &str, scale: u64) -> u64 {
    let mut numerator: u128 = 0;
    let mut denominator: u128 = 1;
    for digit in fraction.bytes().take(19) {
        numerator = numerator * 10 + u128::from(digit - b'0');
        denominator *= 10;
    }
    (numerator * u128::from(scale) / denominator) as u64
}

/// Formats `value / 10^precision` with trailing zeros removed.
fn write_scaled(f: &mut fmt::Formatter<'_>, value: u64, precision: u32) -> fmt::Result {
    let divisor = 10u64.pow(precision);
    write!(f, "{}", value / divisor)?;
    let remainder = value % divisor;
    if remainder != 0 {
        let digits = format!("{remainder:0width$}", width = precision as usize);
        write!(f, ".{}", digits.trim_end_matches('0'))?;
    }
    Ok(())
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        if magnitude == 0 {
            return f.write_str("0s");
        }
        if self.0 < 0 {
            f.write_str("-")?;
        }

        if magnitude < SECOND {
            let (precision, unit) = if magnitude < MICROSECOND {
                (0, "ns")
            } else if magnitude < MILLISECOND {
                (3, "µs")
            } else {
                (6, "ms")
            };
            write_scaled(f, magnitude, precision)?;
            return f.write_str(unit);
        }

        let hours = magnitude / HOUR;
        let minutes = magnitude % HOUR / MINUTE;
        let seconds = magnitude % MINUTE;
        if hours > 0 {
            write!(f, "{hours}h{minutes}m")?;
        } else if minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        write_scaled(f, seconds, 9)?;
        f.write_str("s")
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
