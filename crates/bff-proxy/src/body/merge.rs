//! RFC 7396 JSON Merge Patch.

use super::PatchError;
use serde_json::{Map, Value};

/// Merge `patch` into a copy of `doc`.
///
/// `null` members of an object patch delete the key, object members merge
/// recursively, anything else replaces the target outright.
pub fn merge_patch(doc: &Value, patch: &Value) -> Value {
    let mut merged = doc.clone();
    merge_in_place(&mut merged, patch);
    merged
}

fn merge_in_place(target: &mut Value, patch: &Value) {
    let Value::Object(members) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        for (key, value) in members {
            if value.is_null() {
                map.remove(key);
            } else {
                merge_in_place(map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Byte-level merge. An empty document is treated as `null`.
pub fn merge_bytes(doc: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError> {
    let doc = decode_or_null(doc)?;
    let patch: Value = serde_json::from_slice(patch).map_err(PatchError::InvalidDocument)?;
    serde_json::to_vec(&merge_patch(&doc, &patch)).map_err(PatchError::InvalidDocument)
}

pub(crate) fn decode_or_null(body: &[u8]) -> Result<Value, PatchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(PatchError::InvalidDocument)
}
