//! Whole-second duration value object.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{DomainError, DomainResult};

/// A non-negative number of whole seconds.
///
/// Serialized transparently as a JSON integer so snapshots carry plain
/// numbers (`"remainingTime": 1500`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Seconds(u64);

impl Seconds {
    /// Description used in validation errors.
    const EXPECTED: &'static str = "a non-negative whole number of seconds";

    /// Creates a duration from a whole number of seconds.
    pub const fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Creates a duration from whole minutes.
    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes.saturating_mul(60))
    }

    /// Creates a zero duration.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the number of seconds.
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Returns true if no time remains.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns this duration minus one second, saturating at zero.
    #[must_use]
    pub const fn decremented(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Validates a JSON value as a duration.
    ///
    /// Accepts JSON numbers that are finite, non-negative and integral.
    /// `10` and `10.0` are accepted; `"10"`, `10.5`, `-1` and `null` are
    /// rejected with `DomainError::InvalidFieldValue` naming `field`.
    pub fn from_json(field: &str, value: &Value) -> DomainResult<Self> {
        let invalid = || DomainError::invalid_field(field, value.to_string(), Self::EXPECTED);

        if let Some(secs) = value.as_u64() {
            return Ok(Self(secs));
        }

        // Negative integers and non-numbers land here too; as_f64 is None for
        // anything that isn't a JSON number.
        let float = value.as_f64().ok_or_else(invalid)?;
        if !float.is_finite() || float < 0.0 || float.fract() != 0.0 || float > u64::MAX as f64 {
            return Err(invalid());
        }

        Ok(Self(float as u64))
    }

    /// Parses a human-entered duration.
    ///
    /// Accepts plain seconds (`"90"`) or clock notation (`"25:00"`,
    /// `"1:05:00"`). Returns `None` for anything else.
    pub fn parse_clock(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let mut total: u64 = 0;
        let mut parts = 0;
        for part in input.split(':') {
            parts += 1;
            if parts > 3 || part.is_empty() {
                return None;
            }
            let value: u64 = part.parse().ok()?;
            // Minutes and seconds fields after the first must stay below 60
            if parts > 1 && value >= 60 {
                return None;
            }
            total = total.checked_mul(60)?.checked_add(value)?;
        }

        Some(Self(total))
    }

    /// Formats the duration as a countdown clock.
    ///
    /// Returns format like "25:00", "04:59", "120:00" (minutes are not
    /// wrapped into hours).
    pub fn format_clock(&self) -> String {
        format!("{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl From<u64> for Seconds {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_accepts_integers() {
        assert_eq!(Seconds::from_json("t", &json!(10)).unwrap(), Seconds::new(10));
        assert_eq!(Seconds::from_json("t", &json!(0)).unwrap(), Seconds::zero());
    }

    #[test]
    fn test_from_json_accepts_integral_floats() {
        assert_eq!(Seconds::from_json("t", &json!(10.0)).unwrap(), Seconds::new(10));
    }

    #[test]
    fn test_from_json_rejects_non_numbers() {
        for value in [json!("10"), json!(null), json!(true), json!([10]), json!({"s": 10})] {
            let err = Seconds::from_json("remainingTime", &value).unwrap_err();
            assert!(
                matches!(err, DomainError::InvalidFieldValue { ref field, .. } if field == "remainingTime"),
                "expected rejection for {value}"
            );
        }
    }

    #[test]
    fn test_from_json_rejects_fractions_and_negatives() {
        assert!(Seconds::from_json("t", &json!(10.5)).is_err());
        assert!(Seconds::from_json("t", &json!(-1)).is_err());
        assert!(Seconds::from_json("t", &json!(-1.0)).is_err());
    }

    #[test]
    fn test_decremented_saturates() {
        assert_eq!(Seconds::new(2).decremented(), Seconds::new(1));
        assert_eq!(Seconds::zero().decremented(), Seconds::zero());
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(Seconds::new(1500).format_clock(), "25:00");
        assert_eq!(Seconds::new(299).format_clock(), "04:59");
        assert_eq!(Seconds::zero().format_clock(), "00:00");
        assert_eq!(Seconds::new(7200).format_clock(), "120:00");
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(Seconds::parse_clock("90"), Some(Seconds::new(90)));
        assert_eq!(Seconds::parse_clock("25:00"), Some(Seconds::new(1500)));
        assert_eq!(Seconds::parse_clock(" 4:59 "), Some(Seconds::new(299)));
        assert_eq!(Seconds::parse_clock("1:05:00"), Some(Seconds::new(3900)));
        assert_eq!(Seconds::parse_clock(""), None);
        assert_eq!(Seconds::parse_clock("5:60"), None);
        assert_eq!(Seconds::parse_clock("a:00"), None);
        assert_eq!(Seconds::parse_clock("1:2:3:4"), None);
        assert_eq!(Seconds::parse_clock("-5"), None);
    }

    #[test]
    fn test_from_minutes() {
        assert_eq!(Seconds::from_minutes(25), Seconds::new(1500));
    }

    #[test]
    fn test_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&Seconds::new(42)).unwrap(), "42");
    }
}
