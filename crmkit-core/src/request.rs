use chrono::{DateTime, FixedOffset, SecondsFormat};
use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

use crate::query::encode;

/// A value allowed in request parameters.
///
/// Closed variant mirroring what the API accepts: scalars, timestamps and
/// arbitrarily nested maps/lists. `Null` serializes as JSON null in a POST
/// body and is dropped entirely by the query encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<FixedOffset>),
    List(Vec<ParamValue>),
    Map(IndexMap<String, ParamValue>),
    Null,
}

impl ParamValue {
    /// Wire form of a scalar; `None` for the container variants.
    pub(crate) fn scalar_string(&self) -> Option<String> {
        match self {
            ParamValue::Bool(value) => Some(value.to_string()),
            ParamValue::Int(value) => Some(value.to_string()),
            ParamValue::Float(value) => Some(value.to_string()),
            ParamValue::String(value) => Some(value.clone()),
            ParamValue::Timestamp(value) => {
                Some(value.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            ParamValue::List(_) | ParamValue::Map(_) | ParamValue::Null => None,
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Bool(value) => serializer.serialize_bool(*value),
            ParamValue::Int(value) => serializer.serialize_i64(*value),
            ParamValue::Float(value) => serializer.serialize_f64(*value),
            ParamValue::String(value) => serializer.serialize_str(value),
            ParamValue::Timestamp(value) => {
                serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            ParamValue::List(items) => serializer.collect_seq(items),
            ParamValue::Map(map) => serializer.collect_map(map),
            ParamValue::Null => serializer.serialize_none(),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<DateTime<FixedOffset>> for ParamValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        ParamValue::Timestamp(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, ParamValue>> for ParamValue {
    fn from(map: IndexMap<String, ParamValue>) -> Self {
        ParamValue::Map(map)
    }
}

/// A single RPC call: method name plus an ordered parameter map.
///
/// Immutable once issued; pagination strategies deep-clone before injecting
/// cursor parameters like `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub parameters: IndexMap<String, ParamValue>,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Request {
            method: method.into(),
            parameters: IndexMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Query-string form used for batch `cmd` entries: the bare method when
    /// there are no parameters, otherwise `method?key=value&..`.
    pub fn to_query(&self) -> String {
        if self.parameters.is_empty() {
            return self.method.clone();
        }
        format!("{}?{}", self.method, encode(&self.parameters))
    }
}

/// Parameters of a `*.list` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub select: Vec<String>,
    pub filter: IndexMap<String, ParamValue>,
    pub order: IndexMap<String, String>,
    pub start: Option<i64>,
}

/// A `*.list` call with the structured parameters the cursor-range
/// strategies manipulate.
///
/// The `filter` keys `>{id_key}` / `<{id_key}` and the whole `order` map are
/// reserved by the no-count strategies; supplying them is rejected as a
/// contract violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub method: String,
    pub parameters: ListParams,
}

impl ListRequest {
    pub fn new(method: impl Into<String>) -> Self {
        ListRequest {
            method: method.into(),
            parameters: ListParams::default(),
        }
    }

    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.parameters.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.filter.insert(key.into(), value.into());
        self
    }

    pub fn order(mut self, key: impl Into<String>, direction: impl Into<String>) -> Self {
        self.parameters.order.insert(key.into(), direction.into());
        self
    }

    /// Flatten into a generic [`Request`]. Empty collections are omitted;
    /// `start` is kept whenever set, including the `-1` no-paging sentinel.
    pub fn to_request(&self) -> Request {
        let mut request = Request::new(self.method.clone());
        if !self.parameters.select.is_empty() {
            request.parameters.insert(
                "select".into(),
                ParamValue::from(self.parameters.select.clone()),
            );
        }
        if !self.parameters.filter.is_empty() {
            request
                .parameters
                .insert("filter".into(), ParamValue::Map(self.parameters.filter.clone()));
        }
        if !self.parameters.order.is_empty() {
            let order = self
                .parameters
                .order
                .iter()
                .map(|(key, direction)| (key.clone(), ParamValue::from(direction.clone())))
                .collect::<IndexMap<_, _>>();
            request.parameters.insert("order".into(), ParamValue::Map(order));
        }
        if let Some(start) = self.parameters.start {
            request.parameters.insert("start".into(), ParamValue::Int(start));
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parameters_serialize_as_json_body() {
        let moscow = FixedOffset::east_opt(3 * 3600).unwrap();
        let request = Request::new("crm.lead.list")
            .with_param("select", vec!["ID", "STATUS_ID"])
            .with_param("since", moscow.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap());

        let body = serde_json::to_value(&request.parameters).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "select": ["ID", "STATUS_ID"],
                "since": "2024-01-02T03:04:00+03:00",
            })
        );
    }

    #[test]
    fn null_serializes_as_json_null() {
        let request = Request::new("profile").with_param("missing", ParamValue::Null);
        let body = serde_json::to_value(&request.parameters).unwrap();
        assert_eq!(body, serde_json::json!({ "missing": null }));
    }

    #[test]
    fn query_form_without_parameters_is_bare_method() {
        assert_eq!(Request::new("profile").to_query(), "profile");
    }

    #[test]
    fn query_form_with_parameters() {
        let request = Request::new("department.get").with_param("ID", 1);
        assert_eq!(request.to_query(), "department.get?ID=1");
    }

    #[test]
    fn list_request_flattens_in_parameter_order() {
        let mut request = ListRequest::new("crm.lead.list")
            .select(["ID", "STATUS_ID"])
            .filter("=STATUS_ID", "NEW")
            .order("ID", "ASC");
        request.parameters.start = Some(-1);

        let flat = request.to_request();
        let keys: Vec<_> = flat.parameters.keys().cloned().collect();
        assert_eq!(keys, ["select", "filter", "order", "start"]);
        assert_eq!(
            flat.parameters.get("start"),
            Some(&ParamValue::Int(-1))
        );
    }

    #[test]
    fn list_request_omits_empty_collections() {
        let flat = ListRequest::new("tasks.task.list").to_request();
        assert!(flat.parameters.is_empty());
        assert_eq!(flat.to_query(), "tasks.task.list");
    }
}
