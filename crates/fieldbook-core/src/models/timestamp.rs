//! Record timestamps
//!
//! Records written by this crate carry ISO-8601 strings, but payloads coming
//! from older clients or other devices may carry date-only strings or epoch
//! milliseconds. Everything funnels through [`Timestamp::millis`].

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const NAIVE_DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A point in time as found on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Epoch milliseconds
    Millis(i64),
    /// Textual date or date-time
    Text(String),
}

impl Timestamp {
    /// The current time, formatted the way records are written.
    #[must_use]
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    #[must_use]
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::Text(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Timestamp for a mutation that follows `previous`.
    ///
    /// Never moves backwards: if the stored value is ahead of the local clock
    /// the stored value is kept.
    #[must_use]
    pub fn next_after(previous: Option<&Self>) -> Self {
        let now = Utc::now();
        match previous {
            Some(previous) if time_of(Some(previous)) > now.timestamp_millis() => previous.clone(),
            _ => Self::at(now),
        }
    }

    /// Read a JSON number or string. Fractional numbers round to the
    /// nearest millisecond.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => match number.as_i64() {
                Some(millis) => Some(Self::Millis(millis)),
                None => number
                    .as_f64()
                    .filter(|millis| millis.is_finite())
                    .map(|millis| Self::Millis(millis.round() as i64)),
            },
            Value::String(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }

    /// Parse into epoch milliseconds, `None` when the value is unreadable.
    pub fn millis(&self) -> Option<i64> {
        match self {
            Self::Millis(value) => Some(*value),
            Self::Text(text) => parse_text(text),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("expected timestamp, found {value}"))
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millis(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::at(value)
    }
}

/// Ordering key for an optional timestamp. Missing or unreadable values sort as epoch 0.
pub fn time_of(timestamp: Option<&Timestamp>) -> i64 {
    timestamp.and_then(Timestamp::millis).unwrap_or(0)
}

fn parse_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis());
    }

    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_millis() {
        let text = Timestamp::Text("2024-01-01T00:00:01.500Z".to_string());
        assert_eq!(text.millis(), Some(1_704_067_201_500));
        assert_eq!(Timestamp::Millis(1000).millis(), Some(1000));
    }

    #[test]
    fn parses_date_only_as_midnight_utc() {
        let day_one = Timestamp::Text("2024-01-01".to_string());
        let day_two = Timestamp::Text("2024-01-02".to_string());
        assert_eq!(
            day_two.millis().unwrap() - day_one.millis().unwrap(),
            24 * 60 * 60 * 1000
        );
    }

    #[test]
    fn parses_naive_date_time_and_numeric_text() {
        let naive = Timestamp::Text("2024-01-01 00:00:00".to_string());
        assert_eq!(naive.millis(), Some(1_704_067_200_000));
        assert_eq!(Timestamp::Text("900".to_string()).millis(), Some(900));
    }

    #[test]
    fn unreadable_values_order_as_epoch() {
        let garbage = Timestamp::Text("not a date".to_string());
        assert_eq!(garbage.millis(), None);
        assert_eq!(time_of(Some(&garbage)), 0);
        assert_eq!(time_of(None), 0);
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let parsed: Vec<Timestamp> = serde_json::from_str(r#"[1100, "2024-06-01"]"#).unwrap();
        assert_eq!(parsed[0], Timestamp::Millis(1100));
        assert_eq!(parsed[1], Timestamp::Text("2024-06-01".to_string()));
    }

    #[test]
    fn deserializes_fractional_millis() {
        let parsed: Timestamp = serde_json::from_str("1700000000000.0").unwrap();
        assert_eq!(parsed, Timestamp::Millis(1_700_000_000_000));

        let parsed: Timestamp = serde_json::from_str("1000.6").unwrap();
        assert_eq!(parsed.millis(), Some(1001));
    }

    #[test]
    fn rejects_objects_and_bools() {
        assert!(serde_json::from_str::<Timestamp>(r#"{"seconds": 1}"#).is_err());
        assert!(serde_json::from_str::<Timestamp>("true").is_err());
    }

    #[test]
    fn next_after_never_moves_backwards() {
        let future = Timestamp::Text("2999-01-01T00:00:00.000Z".to_string());
        assert_eq!(Timestamp::next_after(Some(&future)), future);

        let past = Timestamp::Millis(1);
        let next = Timestamp::next_after(Some(&past));
        assert!(time_of(Some(&next)) > 1);
    }
}
