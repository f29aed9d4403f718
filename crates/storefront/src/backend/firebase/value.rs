//! Conversions between plain JSON and Firestore's typed value encoding.
//!
//! Firestore's REST API wraps every value in a type tag:
//!
//! ```json
//! { "name": { "stringValue": "Tee" }, "price": { "integerValue": "85000" } }
//! ```
//!
//! The store works with plain `serde_json` values, so everything crossing the
//! HTTP boundary goes through [`encode_fields`] / [`decode_fields`].

use serde_json::{Map, Value, json};

use crate::backend::{BackendError, DocumentPatch, FieldOp, FieldPath, Fields};

/// Encode one JSON value as a Firestore `Value`.
#[must_use]
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                // u64 beyond i64::MAX or a float
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            if values.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode a field map (the `fields` member of a document or map value).
#[must_use]
pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Decode one Firestore `Value` into plain JSON.
///
/// Timestamps, references, and bytes become strings; geo points become
/// `{latitude, longitude}` objects.
///
/// # Errors
///
/// Returns [`BackendError::Decode`] for an unknown or malformed type tag.
pub fn decode_value(value: &Value) -> Result<Value, BackendError> {
    let (tag, inner) = value
        .as_object()
        .and_then(|obj| obj.iter().next())
        .ok_or_else(|| BackendError::Decode(format!("expected typed value, got {value}")))?;

    match (tag.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", Value::Bool(b)) => Ok(Value::Bool(*b)),
        ("integerValue", Value::String(s)) => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| BackendError::Decode(format!("bad integerValue '{s}': {e}"))),
        ("integerValue" | "doubleValue", Value::Number(n)) => Ok(Value::Number(n.clone())),
        // NaN and infinities arrive as strings; JSON cannot hold them.
        ("doubleValue", Value::String(_)) => Ok(Value::Null),
        (
            "stringValue" | "timestampValue" | "referenceValue" | "bytesValue",
            Value::String(s),
        ) => Ok(Value::String(s.clone())),
        ("geoPointValue", Value::Object(point)) => Ok(json!({
            "latitude": point.get("latitude").cloned().unwrap_or(Value::from(0.0)),
            "longitude": point.get("longitude").cloned().unwrap_or(Value::from(0.0)),
        })),
        ("arrayValue", Value::Object(array)) => match array.get("values") {
            Some(Value::Array(values)) => values
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Ok(Value::Array(Vec::new())),
        },
        ("mapValue", Value::Object(map)) => {
            decode_fields(map.get("fields").unwrap_or(&Value::Null)).map(Value::Object)
        }
        (tag, _) => Err(BackendError::Decode(format!("unsupported value type '{tag}'"))),
    }
}

/// Decode a `fields` object. A missing (`null`) object is an empty map.
///
/// # Errors
///
/// Returns [`BackendError::Decode`] if any value fails to decode.
pub fn decode_fields(fields: &Value) -> Result<Fields, BackendError> {
    match fields {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
            .collect(),
        other => Err(BackendError::Decode(format!("expected fields object, got {other}"))),
    }
}

/// Render a field path for `updateMask` / `fieldPath`.
///
/// Segments that are not simple identifiers are wrapped in backticks, with
/// backticks and backslashes escaped.
#[must_use]
pub fn quote_path(path: &FieldPath) -> String {
    path.segments()
        .iter()
        .map(|segment| {
            if is_simple_segment(segment) {
                segment.clone()
            } else {
                let escaped = segment.replace('\\', "\\\\").replace('`', "\\`");
                format!("`{escaped}`")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn is_simple_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build the `documents:commit` write for a patch.
///
/// Sets become nested `fields` plus a mask entry, deletes are mask entries
/// without a value, and increments become server-side transforms. The
/// `exists` precondition makes the write fail on a missing document.
#[must_use]
pub fn patch_to_write(document_name: &str, patch: &DocumentPatch) -> Value {
    let mut fields = Fields::new();
    let mut mask = Vec::new();
    let mut transforms = Vec::new();

    for op in patch.ops() {
        match op {
            FieldOp::Set(path, value) => {
                insert_nested(&mut fields, path.segments(), value.clone());
                mask.push(quote_path(path));
            }
            FieldOp::Delete(path) => mask.push(quote_path(path)),
            FieldOp::Increment(path, by) => transforms.push(json!({
                "fieldPath": quote_path(path),
                "increment": { "integerValue": by.to_string() },
            })),
        }
    }

    let mut write = json!({
        "update": { "name": document_name, "fields": encode_fields(&fields) },
        "updateMask": { "fieldPaths": mask },
        "currentDocument": { "exists": true },
    });
    if !transforms.is_empty() {
        write["updateTransforms"] = Value::Array(transforms);
    }
    write
}

fn insert_nested(fields: &mut Fields, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            fields.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let slot = fields
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_nested(child, rest, value);
            }
        }
    }
}
