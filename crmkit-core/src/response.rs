use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// The `time` metadata block attached to every successful response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseTime {
    pub start: f64,
    pub finish: f64,
    pub duration: f64,
    pub processing: f64,
    pub date_start: DateTime<FixedOffset>,
    pub date_finish: DateTime<FixedOffset>,
    #[serde(default)]
    pub operating_reset_at: Option<f64>,
    #[serde(default)]
    pub operating: Option<f64>,
}

/// Success envelope of a direct call.
///
/// `total` is an approximate row count only trustworthy on the head request
/// of a run; `next` is the server-declared offset of the following page,
/// absent or zero meaning no more pages.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub result: Value,
    pub time: ResponseTime,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub next: Option<i64>,
}

/// Error envelope, recognized by probing for an `error` field before
/// assuming a success shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(deserialize_with = "code_to_lower")]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// The server emits error codes inconsistently: sometimes an upper-cased
/// string, sometimes a bare integer. Normalize to a lower-cased string
/// before classification.
fn code_to_lower<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(code) => Ok(code.to_lowercase()),
        Value::Number(code) => Ok(code.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number error code, got {other}"
        ))),
    }
}

/// The `result` payload of a composite `batch` call: five maps sharing the
/// synthetic `_0`, `_1`, … keys assigned in submission order.
///
/// Every submitted key appears in exactly one of `result` or `result_error`,
/// and keys in `result` also appear in `result_time`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResult {
    #[serde(deserialize_with = "php_map")]
    pub result: HashMap<String, Value>,
    #[serde(deserialize_with = "php_map")]
    pub result_time: HashMap<String, ResponseTime>,
    #[serde(deserialize_with = "php_map")]
    pub result_error: HashMap<String, ErrorEnvelope>,
    #[serde(deserialize_with = "php_map")]
    pub result_total: HashMap<String, i64>,
    #[serde(deserialize_with = "php_map")]
    pub result_next: HashMap<String, i64>,
}

/// PHP serializes an empty associative array as `[]`, so empty map fields
/// arrive as empty lists on the wire.
fn php_map<'de, D, T>(deserializer: D) -> Result<HashMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) if items.is_empty() => Ok(HashMap::new()),
        value @ Value::Object(_) => serde_json::from_value(value).map_err(de::Error::custom),
        other => Err(de::Error::custom(format!(
            "expected map or empty list, got {other}"
        ))),
    }
}
