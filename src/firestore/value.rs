//! Conversion between Firestore typed values and plain JSON.
//!
//! Firestore's REST API wraps every field in a single-key object naming its
//! type (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). The migration
//! works on plain [`serde_json::Value`]s and converts at the wire boundary.

use serde_json::{json, Map, Value as JsonValue};

use crate::error::AppError;

/// Decode a Firestore `fields` object into a JSON object.
pub fn decode_fields(fields: &Map<String, JsonValue>) -> Result<Map<String, JsonValue>, AppError> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

/// Decode one Firestore typed value.
pub fn decode_value(value: &JsonValue) -> Result<JsonValue, AppError> {
    let obj = value
        .as_object()
        .ok_or_else(|| AppError::Decode(format!("expected typed value object, got {}", value)))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| AppError::Decode("empty typed value".to_string()))?;

    match kind.as_str() {
        "nullValue" => Ok(JsonValue::Null),
        "booleanValue" | "doubleValue" => Ok(inner.clone()),
        // int64 travels as a decimal string
        "integerValue" => match inner {
            JsonValue::String(s) => s
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|e| AppError::Decode(format!("bad integerValue '{}': {}", s, e))),
            JsonValue::Number(_) => Ok(inner.clone()),
            other => Err(AppError::Decode(format!("bad integerValue {}", other))),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(JsonValue::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(JsonValue::Array(values))
        }
        "mapValue" => {
            let fields = match inner.get("fields").and_then(JsonValue::as_object) {
                Some(fields) => decode_fields(fields)?,
                None => Map::new(),
            };
            Ok(JsonValue::Object(fields))
        }
        other => Err(AppError::Decode(format!("unsupported value type '{}'", other))),
    }
}

/// Encode a JSON value as a Firestore typed value.
///
/// Strings always become `stringValue`; timestamps and references are not
/// reconstructed.
pub fn encode_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => json!({ "nullValue": null }),
        JsonValue::Bool(b) => json!({ "booleanValue": b }),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n }),
        },
        JsonValue::String(s) => json!({ "stringValue": s }),
        JsonValue::Array(items) => {
            let values: Vec<JsonValue> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        JsonValue::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode a JSON object as a Firestore `fields` object.
pub fn encode_fields(map: &Map<String, JsonValue>) -> Map<String, JsonValue> {
    map.iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}
