//! Normalization of `*.list` results.

use serde_json::Value;

use crate::error::ApiError;

/// Normalize a `list` method result to a flat item list.
///
/// List endpoints answer in one of two shapes: a plain list of items
/// (`department.get`, `disk.folder.getchildren`) or a map with a single key
/// whose value is the item list (`tasks` in `tasks.task.list`). Anything
/// else violates the wire contract.
pub fn normalize_list(result: Value) -> Result<Vec<Value>, ApiError> {
    match result {
        Value::Array(items) => Ok(items),
        Value::Object(map) => {
            if map.is_empty() {
                return Ok(Vec::new());
            }
            if map.len() != 1 {
                return Err(ApiError::contract(format!(
                    "expected a single-key map for a list result, got keys {:?}",
                    map.keys().collect::<Vec<_>>()
                )));
            }
            match map.into_iter().next() {
                Some((_, Value::Array(items))) => Ok(items),
                Some((key, other)) => Err(ApiError::contract(format!(
                    "expected a list under single key `{key}`, got {other}"
                ))),
                None => Ok(Vec::new()),
            }
        }
        other => Err(ApiError::contract(format!(
            "expected a list or a map for a list result, got {other}"
        ))),
    }
}

/// Extract the numeric id of an item under `id_key`.
///
/// The API renders ids as numbers or numeric strings depending on the
/// endpoint.
pub fn item_id(item: &Value, id_key: &str) -> Result<i64, ApiError> {
    let field = item.get(id_key).ok_or_else(|| {
        ApiError::contract(format!("list item has no `{id_key}` field: {item}"))
    })?;
    match field {
        Value::Number(id) => id.as_i64().ok_or_else(|| {
            ApiError::contract(format!("non-integer `{id_key}` in list item: {id}"))
        }),
        Value::String(id) => id.parse().map_err(|_| {
            ApiError::contract(format!("non-numeric `{id_key}` in list item: {id:?}"))
        }),
        other => Err(ApiError::contract(format!(
            "unexpected `{id_key}` type in list item: {other}"
        ))),
    }
}
