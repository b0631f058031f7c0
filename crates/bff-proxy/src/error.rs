//! Error types shared by every modifier.
//!
//! Leaf components return a single [`ModifierError`]. Aggregating components
//! (groups, the multi-fetcher and the error boundary) collect the errors of
//! their children into a [`MultiError`] instead of stopping at the first one.

use crate::body::PatchError;
use crate::proxy::FetchError;
use std::fmt;

/// Error returned by request/response modifiers and verifiers.
#[derive(Debug, thiserror::Error)]
pub enum ModifierError {
    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// Explicit policy violation reported by a verifier.
    #[error("{0}")]
    Verification(String),

    #[error("{0}")]
    Multi(MultiError),
}

impl From<MultiError> for ModifierError {
    fn from(merr: MultiError) -> Self {
        ModifierError::Multi(merr)
    }
}

/// Aggregate of zero or more modifier errors.
///
/// Adding a `ModifierError::Multi` flattens it, so the aggregate never nests.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<ModifierError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, err: ModifierError) {
        match err {
            ModifierError::Multi(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ModifierError] {
        &self.errors
    }

    /// `Ok(())` when no error was collected, the aggregate otherwise.
    pub fn into_result(self) -> Result<(), ModifierError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ModifierError::Multi(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl Extend<ModifierError> for MultiError {
    fn extend<T: IntoIterator<Item = ModifierError>>(&mut self, iter: T) {
        for err in iter {
            self.add(err);
        }
    }
}
