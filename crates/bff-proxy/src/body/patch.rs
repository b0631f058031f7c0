//! RFC 6902 JSON Patch with tolerance options.

use super::pointer::{parse_index, resolve, resolve_mut, Pointer};
use super::PatchError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One JSON Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add { .. } => "add",
            Operation::Remove { .. } => "remove",
            Operation::Replace { .. } => "replace",
            Operation::Move { .. } => "move",
            Operation::Copy { .. } => "copy",
            Operation::Test { .. } => "test",
        }
    }

    fn map_values(&self, f: &impl Fn(&Value) -> Value) -> Self {
        match self {
            Operation::Add { path, value } => Operation::Add {
                path: path.clone(),
                value: f(value),
            },
            Operation::Replace { path, value } => Operation::Replace {
                path: path.clone(),
                value: f(value),
            },
            Operation::Test { path, value } => Operation::Test {
                path: path.clone(),
                value: f(value),
            },
            other => other.clone(),
        }
    }
}

/// Behavior flags for [`Patch::apply_value`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplyOptions {
    /// Accept `-N` as "N elements from the end" in array indices.
    pub support_negative_indices: bool,
    /// Cap on the serialized bytes moved or copied by one patch. Zero disables it.
    pub accumulated_copy_size_limit: u64,
    pub skip_missing_path_on_remove: bool,
    pub skip_missing_path_on_move: bool,
    pub skip_missing_path_on_copy: bool,
    pub skip_missing_path_on_replace: bool,
    pub ensure_path_exists_on_add: bool,
}

/// An ordered list of operations, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(pub Vec<Operation>);

impl Patch {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self(operations)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this patch with every operation value rewritten by `f`.
    pub fn map_values(&self, f: impl Fn(&Value) -> Value) -> Self {
        Self(self.0.iter().map(|op| op.map_values(&f)).collect())
    }

    /// Decode `doc`, apply, and re-encode.
    pub fn apply(&self, doc: &[u8], options: &ApplyOptions) -> Result<Vec<u8>, PatchError> {
        let doc: Value = serde_json::from_slice(doc).map_err(PatchError::InvalidDocument)?;
        let patched = self.apply_value(&doc, options)?;
        serde_json::to_vec(&patched).map_err(PatchError::InvalidDocument)
    }

    /// Apply every operation in order to a copy of `doc`.
    ///
    /// The input is never modified; the copy is only returned if every
    /// operation succeeded.
    pub fn apply_value(&self, doc: &Value, options: &ApplyOptions) -> Result<Value, PatchError> {
        let mut working = doc.clone();
        let mut run = Run {
            options,
            copied: 0,
        };
        for op in &self.0 {
            run.apply(&mut working, op)?;
        }
        Ok(working)
    }
}

/// State of one patch application.
struct Run<'a> {
    options: &'a ApplyOptions,
    copied: u64,
}

impl Run<'_> {
    fn apply(&mut self, doc: &mut Value, op: &Operation) -> Result<(), PatchError> {
        match op {
            Operation::Add { path, value } => {
                let path = Pointer::parse(path)?;
                self.add(doc, &path, value.clone())
            }
            Operation::Remove { path } => {
                let path = Pointer::parse(path)?;
                match self.remove(doc, &path) {
                    Err(PatchError::PathNotFound(_)) if self.options.skip_missing_path_on_remove => {
                        Ok(())
                    }
                    other => other.map(|_| ()),
                }
            }
            Operation::Replace { path, value } => {
                let path = Pointer::parse(path)?;
                self.replace(doc, &path, value.clone())
            }
            Operation::Move { from, path } => {
                let from = Pointer::parse(from)?;
                let path = Pointer::parse(path)?;
                self.move_value(doc, &from, &path)
            }
            Operation::Copy { from, path } => {
                let from = Pointer::parse(from)?;
                let path = Pointer::parse(path)?;
                self.copy_value(doc, &from, &path)
            }
            Operation::Test { path, value } => {
                let path = Pointer::parse(path)?;
                match path.get(doc) {
                    Some(actual) if actual == value => Ok(()),
                    _ => Err(PatchError::TestFailed(path.to_string())),
                }
            }
        }
    }

    fn add(&mut self, doc: &mut Value, path: &Pointer, value: Value) -> Result<(), PatchError> {
        let Some((parent_tokens, last)) = path.split_last() else {
            *doc = value;
            return Ok(());
        };

        let parent = if self.options.ensure_path_exists_on_add {
            ensure_parent(doc, parent_tokens, last, path)?
        } else {
            resolve_mut(doc, parent_tokens)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?
        };

        match parent {
            Value::Object(map) => {
                map.insert(last.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let index = if last == "-" {
                    items.len()
                } else {
                    self.resolve_index(last, items.len(), true, path)?
                };
                items.insert(index, value);
                Ok(())
            }
            _ => Err(PatchError::NotContainer(path.to_string())),
        }
    }

    fn remove(&mut self, doc: &mut Value, path: &Pointer) -> Result<Value, PatchError> {
        let (parent_tokens, last) = path.split_last().ok_or(PatchError::RemoveRoot)?;
        let parent = resolve_mut(doc, parent_tokens)
            .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;

        match parent {
            Value::Object(map) => map
                .remove(last)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
            Value::Array(items) => {
                let index = self
                    .resolve_index(last, items.len(), false, path)
                    .map_err(|_| PatchError::PathNotFound(path.to_string()))?;
                Ok(items.remove(index))
            }
            _ => Err(PatchError::PathNotFound(path.to_string())),
        }
    }

    fn replace(&mut self, doc: &mut Value, path: &Pointer, value: Value) -> Result<(), PatchError> {
        match self.locate_mut(doc, path) {
            Some(target) => {
                *target = value;
                Ok(())
            }
            None if self.options.skip_missing_path_on_replace => Ok(()),
            None => Err(PatchError::PathNotFound(path.to_string())),
        }
    }

    fn move_value(&mut self, doc: &mut Value, from: &Pointer, path: &Pointer) -> Result<(), PatchError> {
        if from == path {
            return Ok(());
        }
        if path.is_descendant_of(from) {
            return Err(PatchError::MoveIntoChild {
                from: from.to_string(),
                path: path.to_string(),
            });
        }

        let value = match self.remove(doc, from) {
            Ok(value) => value,
            Err(PatchError::PathNotFound(_)) if self.options.skip_missing_path_on_move => {
                return Ok(())
            }
            Err(err) => return Err(err),
        };
        self.account(&value)?;
        self.add(doc, path, value)
    }

    fn copy_value(&mut self, doc: &mut Value, from: &Pointer, path: &Pointer) -> Result<(), PatchError> {
        let value = match self.locate(doc, from) {
            Some(value) => value.clone(),
            None if self.options.skip_missing_path_on_copy => return Ok(()),
            None => return Err(PatchError::PathNotFound(from.to_string())),
        };
        self.account(&value)?;
        self.add(doc, path, value)
    }

    /// Charge a moved or copied value against the copy limit.
    fn account(&mut self, value: &Value) -> Result<(), PatchError> {
        let limit = self.options.accumulated_copy_size_limit;
        if limit == 0 {
            return Ok(());
        }

        let size = serde_json::to_vec(value)
            .map_err(PatchError::InvalidDocument)?
            .len() as u64;
        self.copied += size;
        if self.copied > limit {
            return Err(PatchError::CopyLimitExceeded {
                size: self.copied,
                limit,
            });
        }
        Ok(())
    }

    /// Resolve an array index token against an array of `len` elements.
    ///
    /// `append` admits the one-past-the-end slot used by `add`.
    fn resolve_index(
        &self,
        token: &str,
        len: usize,
        append: bool,
        path: &Pointer,
    ) -> Result<usize, PatchError> {
        if let Some(index) = parse_index(token) {
            if index < len || (append && index == len) {
                return Ok(index);
            }
        } else if self.options.support_negative_indices {
            if let Some(back) = token.strip_prefix('-').and_then(parse_index) {
                if (1..=len).contains(&back) {
                    return Ok(len - back);
                }
            }
        }
        Err(PatchError::InvalidIndex(path.to_string()))
    }

    fn locate<'v>(&self, doc: &'v Value, path: &Pointer) -> Option<&'v Value> {
        let (parent_tokens, last) = match path.split_last() {
            Some(split) => split,
            None => return Some(doc),
        };
        match resolve(doc, parent_tokens)? {
            Value::Array(items) => {
                let index = self.resolve_index(last, items.len(), false, path).ok()?;
                items.get(index)
            }
            Value::Object(map) => map.get(last),
            _ => None,
        }
    }

    fn locate_mut<'v>(&self, doc: &'v mut Value, path: &Pointer) -> Option<&'v mut Value> {
        let (parent_tokens, last) = match path.split_last() {
            Some(split) => split,
            None => return Some(doc),
        };
        match resolve_mut(doc, parent_tokens)? {
            Value::Array(items) => {
                let index = self.resolve_index(last, items.len(), false, path).ok()?;
                items.get_mut(index)
            }
            Value::Object(map) => map.get_mut(last),
            _ => None,
        }
    }
}

/// Walk to the parent of `last`, creating missing containers on the way.
///
/// A created container is an array when the token indexing into it is `0` or
/// `-`, an object otherwise.
fn ensure_parent<'v>(
    doc: &'v mut Value,
    tokens: &[String],
    last: &str,
    path: &Pointer,
) -> Result<&'v mut Value, PatchError> {
    let mut node = doc;
    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1).map(String::as_str).unwrap_or(last);
        if node.is_null() {
            *node = empty_for(token);
        }

        node = match node {
            Value::Object(map) => map
                .entry(token.clone())
                .or_insert_with(|| empty_for(next)),
            Value::Array(items) => {
                let index = if token == "-" {
                    items.len()
                } else {
                    parse_index(token).ok_or_else(|| PatchError::InvalidIndex(path.to_string()))?
                };
                if index == items.len() {
                    items.push(empty_for(next));
                }
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::InvalidIndex(path.to_string()))?
            }
            _ => return Err(PatchError::NotContainer(path.to_string())),
        };
    }
    Ok(node)
}

fn empty_for(token: &str) -> Value {
    if token == "0" || token == "-" {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}
