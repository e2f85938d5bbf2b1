use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CodecError, CodecResult};

/// Rebuild a JSON value with object keys sorted at every nesting level.
///
/// Array element order is significant and left untouched.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Serialize any value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let value = serde_json::to_value(value).map_err(|e| CodecError::Encode(e.to_string()))?;
    serde_json::to_vec(&canonicalize(value)).map_err(|e| CodecError::Encode(e.to_string()))
}
