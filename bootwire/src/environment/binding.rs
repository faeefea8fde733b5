//! Value types used by properties holders: durations with unit suffixes, data sizes, and helpers
//! for lenient enum and list binding. All types deserialize from the string representations used
//! in configuration sources.

use serde::de::{DeserializeOwned, Error as DeError, IntoDeserializer, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt::{self, Display, Formatter};
use std::time::Duration as StdDuration;
use thiserror::Error;

/// Error parsing a [Duration] literal.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("invalid duration '{0}': expected an integer with an optional ns/us/ms/s/m/h/d suffix")]
pub struct ParseDurationError(String);

/// Error parsing a [DataSize] literal.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("invalid data size '{0}': expected an integer with an optional B/KB/MB/GB/TB suffix")]
pub struct ParseDataSizeError(String);

/// A duration bound from configuration. Accepts a bare integer, interpreted as milliseconds, or a
/// string with a unit suffix, e.g. `500ms`, `2s`, `10m`, `1h`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(StdDuration);

impl Duration {
    pub const fn from_millis(millis: u64) -> Self {
        Self(StdDuration::from_millis(millis))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(StdDuration::from_secs(secs))
    }

    /// Returns the underlying [std::time::Duration].
    pub const fn as_std(self) -> StdDuration {
        self.0
    }

    /// Parses a duration literal; bare integers are interpreted as milliseconds.
    pub fn parse(value: &str) -> Result<Self, ParseDurationError> {
        let value = value.trim();
        let (digits, unit) = split_literal(value);
        let amount: u64 = digits
            .parse()
            .map_err(|_| ParseDurationError(value.to_string()))?;

        let seconds = |seconds_per_unit: u64| {
            amount
                .checked_mul(seconds_per_unit)
                .map(|seconds| Self(StdDuration::from_secs(seconds)))
                .ok_or_else(|| ParseDurationError(value.to_string()))
        };

        match unit {
            "ns" => Ok(Self(StdDuration::from_nanos(amount))),
            "us" => Ok(Self(StdDuration::from_micros(amount))),
            "ms" | "" => Ok(Self(StdDuration::from_millis(amount))),
            "s" => Ok(Self(StdDuration::from_secs(amount))),
            "m" => seconds(60),
            "h" => seconds(3600),
            "d" => seconds(86400),
            _ => Err(ParseDurationError(value.to_string())),
        }
    }
}

impl From<StdDuration> for Duration {
    fn from(value: StdDuration) -> Self {
        Self(value)
    }
}

impl From<Duration> for StdDuration {
    fn from(value: Duration) -> Self {
        value.0
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        if nanos == 0 {
            return write!(f, "0s");
        }

        for (unit, nanos_per_unit) in [
            ("d", 86400 * 1_000_000_000u128),
            ("h", 3600 * 1_000_000_000u128),
            ("m", 60 * 1_000_000_000u128),
            ("s", 1_000_000_000),
            ("ms", 1_000_000),
            ("us", 1_000),
        ] {
            if nanos % nanos_per_unit == 0 {
                return write!(f, "{}{}", nanos / nanos_per_unit, unit);
            }
        }

        write!(f, "{nanos}ns")
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("an integer of milliseconds or a string with a unit suffix")
            }

            fn visit_u64<E: DeError>(self, value: u64) -> Result<Self::Value, E> {
                Ok(Duration::from_millis(value))
            }

            fn visit_i64<E: DeError>(self, value: i64) -> Result<Self::Value, E> {
                u64::try_from(value)
                    .map(Duration::from_millis)
                    .map_err(|_| E::custom(format!("invalid duration '{value}': negative")))
            }

            fn visit_str<E: DeError>(self, value: &str) -> Result<Self::Value, E> {
                Duration::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// A data size bound from configuration. Accepts a bare integer, interpreted as bytes, or a string
/// with a binary unit suffix, e.g. `512B`, `2KB`, `10MB`. Units use 1024 multipliers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataSize(u64);

impl DataSize {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_kilobytes(kilobytes: u64) -> Self {
        Self(kilobytes * 1024)
    }

    pub const fn from_megabytes(megabytes: u64) -> Self {
        Self(megabytes * 1024 * 1024)
    }

    pub const fn as_bytes(self) -> u64 {
        self.0
    }

    /// Parses a data size literal; bare integers are interpreted as bytes.
    pub fn parse(value: &str) -> Result<Self, ParseDataSizeError> {
        let value = value.trim();
        let (digits, unit) = split_literal(value);
        let amount: u64 = digits
            .parse()
            .map_err(|_| ParseDataSizeError(value.to_string()))?;

        let multiplier = match unit.to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "KB" => 1024,
            "MB" => 1024 * 1024,
            "GB" => 1024 * 1024 * 1024,
            "TB" => 1024u64 * 1024 * 1024 * 1024,
            _ => return Err(ParseDataSizeError(value.to_string())),
        };

        amount
            .checked_mul(multiplier)
            .map(Self)
            .ok_or_else(|| ParseDataSizeError(value.to_string()))
    }
}

impl Display for DataSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0B");
        }

        for (unit, bytes_per_unit) in [
            ("TB", 1024u64 * 1024 * 1024 * 1024),
            ("GB", 1024 * 1024 * 1024),
            ("MB", 1024 * 1024),
            ("KB", 1024),
        ] {
            if self.0 % bytes_per_unit == 0 {
                return write!(f, "{}{}", self.0 / bytes_per_unit, unit);
            }
        }

        write!(f, "{}B", self.0)
    }
}

impl<'de> Deserialize<'de> for DataSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DataSizeVisitor;

        impl Visitor<'_> for DataSizeVisitor {
            type Value = DataSize;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("an integer of bytes or a string with a unit suffix")
            }

            fn visit_u64<E: DeError>(self, value: u64) -> Result<Self::Value, E> {
                Ok(DataSize::from_bytes(value))
            }

            fn visit_i64<E: DeError>(self, value: i64) -> Result<Self::Value, E> {
                u64::try_from(value)
                    .map(DataSize::from_bytes)
                    .map_err(|_| E::custom(format!("invalid data size '{value}': negative")))
            }

            fn visit_str<E: DeError>(self, value: &str) -> Result<Self::Value, E> {
                DataSize::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DataSizeVisitor)
    }
}

/// Case-insensitive enum binding: the raw value is lowercased before matching variant names, which
/// should therefore be declared with `#[serde(rename_all = "lowercase")]`.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = String::deserialize(deserializer)?;
    T::deserialize(value.to_lowercase().into_deserializer())
}

/// [lenient] for optional fields; should be combined with a container-level `#[serde(default)]`.
pub fn lenient_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    lenient(deserializer).map(Some)
}

/// Binds a string list from either an array of strings or a single comma-separated string.
pub fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    struct StringListVisitor;

    impl<'de> Visitor<'de> for StringListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str("a list of strings or a comma-separated string")
        }

        fn visit_str<E: DeError>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value
                .split(',')
                .map(str::trim)
                .filter(|element| !element.is_empty())
                .map(str::to_string)
                .collect())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut elements = Vec::new();
            while let Some(element) = seq.next_element::<String>()? {
                elements.push(element);
            }

            Ok(elements)
        }
    }

    deserializer.deserialize_any(StringListVisitor)
}

fn split_literal(value: &str) -> (&str, &str) {
    let digits_end = value
        .find(|character: char| !character.is_ascii_digit())
        .unwrap_or(value.len());
    (&value[..digits_end], value[digits_end..].trim_start())
}
