//! Serde helpers for inbound message deserialization.
//!
//! When the `tracing` feature is enabled, unknown fields are logged as warnings
//! and a failed deserialization logs the path and value that were rejected,
//! helping detect server-side contract changes.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize JSON with unknown field warnings.
///
/// Unknown fields trigger warnings but never cause deserialization to fail.
///
/// # Example
///
/// ```ignore
/// let json = serde_json::json!({ "id": 1, "name": "Ada", "avatar": "ada.png" });
/// let item: Item = deserialize_with_warnings(json)?;
/// // Logs: WARN unknown field in WebSocket message field="avatar" value="\"ada.png\""
/// ```
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    use std::any::type_name;

    tracing::trace!(
        type_name = %type_name::<T>(),
        json = %value,
        "deserializing JSON"
    );

    // Keep a copy to look up offending values after `value` is consumed
    let original = value.clone();
    let mut unknown_paths: Vec<String> = Vec::new();

    let result: T = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        // Re-deserialize with serde_path_to_error to locate the failure
        let path_result: Result<T, _> = serde_path_to_error::deserialize(&original);
        if let Err(path_err) = path_result {
            let path = path_err.path().to_string();

            tracing::warn!(
                type_name = %type_name::<T>(),
                path = %path,
                value = %format_value(lookup_value(&original, &path)),
                error = %path_err.inner(),
                "deserialization failed"
            );
        }
    })?;

    for path in unknown_paths {
        tracing::warn!(
            type_name = %type_name::<T>(),
            field = %path,
            value = %format_value(lookup_value(&original, &path)),
            "unknown field in WebSocket message"
        );
    }

    Ok(result)
}

/// Pass-through deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Look up a value by a `serde_ignored` or `serde_path_to_error` path.
///
/// Accepts dotted (`sections.0.items`) and bracketed (`sections[0].items`)
/// segments. `?` segments mark `Option` wrappers and are skipped.
#[cfg(feature = "tracing")]
fn lookup_value<'value>(value: &'value Value, path: &str) -> Option<&'value Value> {
    path.split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty() && *segment != "?")
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
            _ => None,
        })
}

#[cfg(feature = "tracing")]
fn format_value(value: Option<&Value>) -> String {
    value.map_or_else(|| "<unable to retrieve>".to_owned(), Value::to_string)
}
