use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const KIB: u64 = 1 << 10;

/// Binary units used for the canonical text form, largest first.
const BINARY_UNITS: [(&str, u64); 6] = [
    ("EiB", KIB << 50),
    ("PiB", KIB << 40),
    ("TiB", KIB << 30),
    ("GiB", KIB << 20),
    ("MiB", KIB << 10),
    ("KiB", KIB),
];

/// A number of bytes.
///
/// Parsing is strict: every magnitude needs a unit. Decimal units (`KB`,
/// `MB`, ...) are powers of 1000 and binary units (`KiB`, `MiB`, ...) powers
/// of 1024. The canonical text form uses compound binary units, e.g.
/// `1GiB512MiB`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Size(u64);

impl Size {
    pub const ZERO: Self = Self(0);

    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_kib(kib: u64) -> Self {
        Self(kib * KIB)
    }

    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * KIB * KIB)
    }

    pub const fn as_bytes(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Error returned when text is not a valid byte size.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSizeError {
    #[error("invalid size '{0}'")]
    Invalid(String),

    #[error("missing unit in size '{0}'")]
    MissingUnit(String),

    #[error("unknown unit '{unit}' in size '{input}'")]
    UnknownUnit { unit: String, input: String },

    #[error("size '{0}' overflows")]
    Overflow(String),
}

fn unit_bytes(unit: &str) -> Option<u64> {
    Some(match unit {
        "B" => 1,
        "KB" | "kB" => 1_000,
        "MB" => 1_000_000,
        "GB" => 1_000_000_000,
        "TB" => 1_000_000_000_000,
        "PB" => 1_000_000_000_000_000,
        "EB" => 1_000_000_000_000_000_000,
        "KiB" => KIB,
        "MiB" => KIB << 10,
        "GiB" => KIB << 20,
        "TiB" => KIB << 30,
        "PiB" => KIB << 40,
        "EiB" => KIB << 50,
        _ => return None,
    })
}

impl FromStr for Size {
    type Err = ParseSizeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let overflow = || ParseSizeError::Overflow(input.to_string());
        if input.is_empty() {
            return Err(ParseSizeError::Invalid(input.to_string()));
        }

        let mut rest = input;
        let mut total: u64 = 0;
        while !rest.is_empty() {
            let whole_len = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let (whole, after) = rest.split_at(whole_len);
            rest = after;
            let mut fraction = "";
            if let Some(after_dot) = rest.strip_prefix('.') {
                let end = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                fraction = &after_dot[..end];
                rest = &after_dot[end..];
            }
            if whole.is_empty() && fraction.is_empty() {
                return Err(ParseSizeError::Invalid(input.to_string()));
            }

            let unit_len = rest
                .find(|c: char| c == '.' || c.is_ascii_digit())
                .unwrap_or(rest.len());
            if unit_len == 0 {
                return Err(ParseSizeError::MissingUnit(input.to_string()));
            }
            let unit = &rest[..unit_len];
            rest = &rest[unit_len..];
            let scale = unit_bytes(unit).ok_or_else(|| ParseSizeError::UnknownUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })?;

            let whole: u64 = if whole.is_empty() {
                0
            } else {
                whole.parse().map_err(|_| overflow())?
            };
            let value = whole
                .checked_mul(scale)
                .and_then(|v| v.checked_add(scale_fraction(fraction, scale)))
                .ok_or_else(overflow)?;
            total = total.checked_add(value).ok_or_else(overflow)?;
        }
        Ok(Self(total))
    }
}

fn scale_fraction(fraction: &str, scale: u64) -> u64 {
    let mut numerator: u128 = 0;
    let mut denominator: u128 = 1;
    for digit in fraction.bytes().take(19) {
        numerator = numerator * 10 + u128::from(digit - b'0');
        denominator *= 10;
    }
    (numerator * u128::from(scale) / denominator) as u64
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0B");
        }
        let mut remaining = self.0;
        for (unit, scale) in BINARY_UNITS {
            if remaining >= scale {
                write!(f, "{}{unit}", remaining / scale)?;
                remaining %= scale;
            }
        }
        if remaining > 0 {
            write!(f, "{remaining}B")?;
        }
        Ok(())
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
