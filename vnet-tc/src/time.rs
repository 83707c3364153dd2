//! Time values in the notation `tc` accepts.

use std::{fmt, str::FromStr, time::Duration};

use crate::Error;

const UNITS: [(&str, f64); 6] = [
    ("usec", 1.0),
    ("msec", 1_000.0),
    ("sec", 1_000_000.0),
    ("us", 1.0),
    ("ms", 1_000.0),
    ("s", 1_000_000.0),
];

/// A delay or jitter value such as `5ms`, `100us` or `1.5s`.
///
/// The text is kept as written so the generated command shows exactly what the caller
/// asked for. Bare numbers are microseconds, as with `tc`. Negative values parse so that
/// validation can report them.
#[derive(Debug, Clone, PartialEq)]
pub struct Time {
    text: String,
    micros: f64,
}

impl Time {
    pub fn parse(s: &str) -> Result<Self, Error> {
        let text = s.trim();
        let (number, factor) = UNITS
            .iter()
            .find_map(|(unit, factor)| text.strip_suffix(unit).map(|n| (n, *factor)))
            .unwrap_or((text, 1.0));

        let value: f64 = number.trim().parse().map_err(|_| Error::InvalidTime(s.to_string()))?;
        if !value.is_finite() {
            return Err(Error::InvalidTime(s.to_string()));
        }

        Ok(Self { text: text.to_string(), micros: value * factor })
    }

    pub fn from_millis(ms: u64) -> Self {
        Self { text: format!("{ms}ms"), micros: ms as f64 * 1_000.0 }
    }

    pub const fn as_micros(&self) -> f64 {
        self.micros
    }

    pub fn is_negative(&self) -> bool {
        self.micros < 0.0
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for Time {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Duration> for Time {
    fn from(value: Duration) -> Self {
        let micros = value.as_micros();
        Self { text: format!("{micros}us"), micros: micros as f64 }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
