//! Tolerant field deserializers for records written by older clients.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::timestamp::Timestamp;

/// Accept a string, number, bool or null where a string is expected.
///
/// Null becomes `""`; numbers and bools keep their JSON text.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string, found {other}"
        ))),
    }
}

/// Like [`string`], but empty values become `None`.
pub fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = string(deserializer)?;
    Ok(if value.is_empty() { None } else { Some(value) })
}

/// Accept a bool, a `"true"`/`"false"` string, a number, or null.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        _ => false,
    })
}

/// A list of strings where null means empty and non-string entries are dropped.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// A timestamp where null or an unreadable shape becomes `None`.
pub fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Timestamp::from_value(&value))
}

/// Like [`millis`], but absent or unreadable values stay `None`.
pub fn optional_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = optional_timestamp(deserializer)?;
    Ok(value.as_ref().and_then(Timestamp::millis))
}

/// Epoch milliseconds from either a number or any textual form [`Timestamp`] reads.
pub fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_millis(deserializer)?.unwrap_or(0))
}

/// A list that keeps every element that parses and drops the rest.
///
/// Null or a non-array value reads as empty.
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => parse_each(items, "list"),
        _ => Vec::new(),
    })
}

/// Parse each element on its own, logging and skipping the ones that fail.
pub(crate) fn parse_each<T: DeserializeOwned>(items: Vec<Value>, context: &str) -> Vec<T> {
    let total = items.len();
    let parsed: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!("Skipping unreadable entry {} in {}: {}", index, context, error);
                None
            }
        })
        .collect();
    if parsed.len() < total {
        tracing::warn!("Kept {} of {} entries in {}", parsed.len(), total, context);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tombstone;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "list")]
        items: Vec<Tombstone>,
        #[serde(default, deserialize_with = "optional_timestamp")]
        at: Option<Timestamp>,
    }

    #[test]
    fn list_skips_entries_that_do_not_parse() {
        let holder: Holder = serde_json::from_str(
            r#"{"items": [{"id": "a", "deletedAt": 5}, 42, {"id": "b", "deletedAt": 7.0}]}"#,
        )
        .unwrap();

        let ids: Vec<&str> = holder.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(holder.items[1].deleted_at, 7);
    }

    #[test]
    fn list_reads_null_and_objects_as_empty() {
        let holder: Holder = serde_json::from_str(r#"{"items": null}"#).unwrap();
        assert!(holder.items.is_empty());
        let holder: Holder = serde_json::from_str(r#"{"items": {"id": "a"}}"#).unwrap();
        assert!(holder.items.is_empty());
    }

    #[test]
    fn optional_timestamp_drops_unreadable_shapes() {
        let holder: Holder = serde_json::from_str(r#"{"at": {"seconds": 1}}"#).unwrap();
        assert_eq!(holder.at, None);
        let holder: Holder = serde_json::from_str(r#"{"at": 12.0}"#).unwrap();
        assert_eq!(holder.at, Some(Timestamp::Millis(12)));
    }
}
