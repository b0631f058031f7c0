//! Apply one patch to every element of an array inside a document.

use super::patch::{ApplyOptions, Operation, Patch};
use super::pointer::Pointer;
use super::PatchError;
use serde_json::Value;

/// Patch each element of the array at `path`, then splice the rewritten
/// array back into a copy of `doc`.
///
/// `""` and `"/"` address the document itself, which must then be an array.
/// The first failing element aborts the whole operation.
pub fn apply_to_array_at(
    doc: &Value,
    path: &str,
    patch: &Patch,
    options: &ApplyOptions,
) -> Result<Value, PatchError> {
    let at_root = path.is_empty() || path == "/";
    let target = if at_root {
        Some(doc)
    } else {
        Pointer::parse(path)?.get(doc)
    };

    let items = match target {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(PatchError::NotAnArray(path.to_string())),
        None => return Err(PatchError::PathNotFound(path.to_string())),
    };

    let mapped = items
        .iter()
        .map(|item| patch.apply_value(item, options))
        .collect::<Result<Vec<_>, _>>()?;

    if at_root {
        return Ok(Value::Array(mapped));
    }

    Patch::new(vec![Operation::Replace {
        path: path.to_string(),
        value: Value::Array(mapped),
    }])
    .apply_value(doc, &ApplyOptions::default())
}
