use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time::Duration};

/// A non-negative duration written in Go's `time.ParseDuration` syntax, e.g.
/// `"10s"`, `"250ms"` or `"1h30m"`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoDuration(Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("durations must not be negative")]
    Negative,

    #[error("duration is too large")]
    Overflow,

    #[error("invalid floating-point number: {}", .0)]
    NotANumber(#[from] std::num::ParseFloatError),
}

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', or 'h'";

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

// === impl GoDuration ===

impl GoDuration {
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    #[inline]
    pub const fn get(self) -> Duration {
        self.0
    }
}

impl From<Duration> for GoDuration {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<GoDuration> for Duration {
    fn from(GoDuration(duration): GoDuration) -> Self {
        duration
    }
}

impl fmt::Display for GoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        if nanos == 0 {
            return f.write_str("0s");
        }

        // Prints the value in the largest unit that represents it exactly.
        for (unit, len) in [
            ("h", HOUR.as_nanos()),
            ("m", MINUTE.as_nanos()),
            ("s", 1_000_000_000),
            ("ms", 1_000_000),
            ("us", 1_000),
        ] {
            if nanos % len == 0 {
                return write!(f, "{}{unit}", nanos / len);
            }
        }
        write!(f, "{nanos}ns")
    }
}

impl FromStr for GoDuration {
    type Err = ParseError;

    fn from_str(mut s: &str) -> Result<Self, Self::Err> {
        fn unit_len(unit: &str) -> Result<Duration, ParseError> {
            match unit {
                "ns" => Ok(Duration::from_nanos(1)),
                // U+00B5 is the "micro sign" while U+03BC is "Greek letter mu"
                "us" | "\u{00b5}s" | "\u{03bc}s" => Ok(Duration::from_micros(1)),
                "ms" => Ok(Duration::from_millis(1)),
                "s" => Ok(Duration::from_secs(1)),
                "m" => Ok(MINUTE),
                "h" => Ok(HOUR),
                _ => Err(ParseError::InvalidUnit),
            }
        }

        if s.starts_with('-') {
            return Err(ParseError::Negative);
        }
        s = s.trim_start_matches('+');
        if s == "0" {
            return Ok(Self::default());
        }
        if s.is_empty() {
            return Err(ParseError::NoUnit);
        }

        let mut total = Duration::ZERO;
        while !s.is_empty() {
            let unit_start = s
                .find(|c: char| c.is_alphabetic() || c == '\u{00b5}' || c == '\u{03bc}')
                .ok_or(ParseError::NoUnit)?;
            let (val, rest) = s.split_at(unit_start);
            let val = val.parse::<f64>()?;
            let unit_end = rest
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(rest.len());
            let (unit, rest) = rest.split_at(unit_end);
            if val.is_sign_negative() {
                return Err(ParseError::Negative);
            }
            let len = Duration::try_from_secs_f64(unit_len(unit)?.as_secs_f64() * val)
                .map_err(|_| ParseError::Overflow)?;
            total = total.checked_add(len).ok_or(ParseError::Overflow)?;
            s = rest;
        }

        Ok(Self(total))
    }
}

impl Serialize for GoDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GoDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = GoDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string in Go `time.Duration.String()` format")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<GoDuration>().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}
