//! URL path templates with named parameters.
//!
//! A template such as `/users/:id/orders/:orderId` is split once, at load time,
//! into `(prefix, name, terminator)` segments. Matching walks the concrete path
//! left to right without backtracking: each parameter consumes the shortest
//! non-empty run of bytes that contains neither `/` nor its terminator.

use crate::context::{param_key, ContextStore};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

static PARAM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[/.;,]:([^/.;,]+)").expect("param token regex is valid"));

/// Errors raised while compiling a path template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("duplicate path parameter ':{name}' in pattern {pattern:?}")]
    DuplicateParam { pattern: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    /// Literal text preceding the parameter, delimiter included.
    prefix: String,
    name: String,
    terminator: u8,
}

/// Parameters captured by a successful match, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Write every binding into `ctx` under its namespaced key.
    pub fn commit(&self, ctx: &mut dyn ContextStore) {
        for (name, value) in &self.0 {
            ctx.set(&param_key(name), value.clone());
        }
    }
}

/// A compiled path template. Immutable and shareable across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    tail: String,
}

impl PathPattern {
    /// Compile a template, rejecting duplicate parameter names.
    pub fn compile(raw: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = 0;

        for token in PARAM_TOKEN.find_iter(raw) {
            // token is `<delim>:<name>`
            let name = &raw[token.start() + 2..token.end()];
            if !seen.insert(name) {
                return Err(PatternError::DuplicateParam {
                    pattern: raw.to_string(),
                    name: name.to_string(),
                });
            }

            segments.push(Segment {
                prefix: raw[cursor..=token.start()].to_string(),
                name: name.to_string(),
                terminator: raw.as_bytes().get(token.end()).copied().unwrap_or(b'/'),
            });
            cursor = token.end();
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            tail: raw[cursor..].to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parameter names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.name.as_str())
    }

    /// Match a concrete path without touching any context.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let mut rest = path;
        let mut params = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            rest = rest.strip_prefix(segment.prefix.as_str())?;

            let len = rest
                .bytes()
                .position(|b| b == segment.terminator || b == b'/')
                .unwrap_or(rest.len());
            if len == 0 {
                return None;
            }

            params.push((segment.name.clone(), rest[..len].to_string()));
            rest = &rest[len..];
        }

        (rest == self.tail).then_some(PathParams(params))
    }

    /// Match and, only on a full match, bind every parameter into `ctx`.
    pub fn match_into(&self, path: &str, ctx: &mut dyn ContextStore) -> bool {
        match self.match_path(path) {
            Some(params) => {
                params.commit(ctx);
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
