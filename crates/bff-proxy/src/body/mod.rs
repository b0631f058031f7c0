//! JSON body transformation.
//!
//! Every operation works on a decoded copy of the body and only hands back a
//! new buffer once the whole transformation succeeded, so a failing patch
//! never leaves a half-modified body behind.
//!
//! # Module Structure
//!
//! - `pointer` - RFC 6901 JSON pointers
//! - `patch` - RFC 6902 JSON Patch with tolerance options
//! - `merge` - RFC 7396 JSON Merge Patch
//! - `map_patch` - Apply a patch to every element of an array
//! - `modifier` - Request/response modifiers built on the above

mod map_patch;
mod merge;
mod modifier;
mod patch;
mod pointer;

pub use map_patch::apply_to_array_at;
pub use merge::{merge_bytes, merge_patch};
pub use modifier::{JsonMapPatchModifier, JsonPatchModifier};
pub use patch::{ApplyOptions, Operation, Patch};
pub use pointer::Pointer;

pub(crate) use merge::decode_or_null;

/// Errors raised while patching a JSON document.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("invalid JSON document: {0}")]
    InvalidDocument(#[source] serde_json::Error),

    #[error("invalid JSON pointer {0:?}")]
    InvalidPointer(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("invalid array index in {0}")]
    InvalidIndex(String),

    #[error("parent of {0} is not an object or array")]
    NotContainer(String),

    #[error("value at {0} is not an array")]
    NotAnArray(String),

    #[error("cannot move {from} into its own child {path}")]
    MoveIntoChild { from: String, path: String },

    #[error("cannot remove the document root")]
    RemoveRoot,

    #[error("test operation failed at {0}")]
    TestFailed(String),

    #[error("accumulated copy size {size} exceeds limit {limit}")]
    CopyLimitExceeded { size: u64, limit: u64 },
}
