//! Query string rewriting.
//!
//! Queries are decoded form-style (`+` is a space), edited, and re-encoded
//! with keys in sorted order.

use crate::context::{resolve_placeholder, ContextStore};
use crate::error::ModifierError;
use crate::modifier::{RequestModifier, Stage};
use crate::proxy::ProxyRequest;
use async_trait::async_trait;
use hyper::http::uri::PathAndQuery;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Decoded query parameters, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues(BTreeMap<String, Vec<String>>);

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn encode(raw: &str) -> String {
    urlencoding::encode(raw).replace("%20", "+")
}

impl QueryValues {
    pub fn parse(query: &str) -> Self {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            values.entry(decode(key)).or_default().push(decode(value));
        }
        Self(values)
    }

    /// First value of `key`; an empty value counts as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|vs| vs.first())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Replace all values of `key`.
    pub fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), vec![value]);
    }

    pub fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (key, values) in &self.0 {
            for value in values {
                if !out.is_empty() {
                    out.push('&');
                }
                out.push_str(&encode(key));
                out.push('=');
                out.push_str(&encode(value));
            }
        }
        out
    }
}

/// Rebuild `uri` with a new query, dropping the `?` when it is empty.
pub(crate) fn with_query(uri: &Uri, query: &str) -> Result<Uri, ModifierError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::from_str(&path_and_query)
            .map_err(|e| ModifierError::InvalidUri(e.to_string()))?,
    );
    Uri::from_parts(parts).map_err(|e| ModifierError::InvalidUri(e.to_string()))
}

fn rewrite_query(
    req: &mut ProxyRequest,
    edit: impl FnOnce(&mut QueryValues),
) -> Result<(), ModifierError> {
    let mut values = QueryValues::parse(req.uri().query().unwrap_or_default());
    edit(&mut values);

    let encoded = values.encode();
    if req.uri().query().unwrap_or_default() != encoded {
        *req.uri_mut() = with_query(req.uri(), &encoded)?;
    }
    Ok(())
}

/// Query string operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    /// Set only when absent.
    Add,
    /// Set only when present.
    Replace,
    Delete,
    /// Copy the value of `name` to the key named by `value`.
    Copy,
    /// Copy, then delete `name`.
    Move,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown query string operation {0:?}")]
pub struct InvalidQueryOp(pub String);

impl FromStr for QueryOp {
    type Err = InvalidQueryOp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(QueryOp::Add),
            "replace" => Ok(QueryOp::Replace),
            "delete" => Ok(QueryOp::Delete),
            "copy" => Ok(QueryOp::Copy),
            "move" => Ok(QueryOp::Move),
            other => Err(InvalidQueryOp(other.to_string())),
        }
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryOp::Add => "add",
            QueryOp::Replace => "replace",
            QueryOp::Delete => "delete",
            QueryOp::Copy => "copy",
            QueryOp::Move => "move",
        };
        f.write_str(name)
    }
}

/// Edits one query parameter of the request.
///
/// For `add` and `replace`, a value of the form `:name` resolves to the bound
/// path parameter.
#[derive(Debug, Clone)]
pub struct QueryStringModifier {
    op: QueryOp,
    name: String,
    value: String,
}

impl QueryStringModifier {
    pub fn new(op: QueryOp, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn into_stage(self) -> Stage {
        Stage::new().with_request(Arc::new(self))
    }
}

#[async_trait]
impl RequestModifier for QueryStringModifier {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!(
            "querystring.Modifier.ModifyRequest: {} {} on {}",
            self.op,
            self.name,
            req.uri()
        );

        rewrite_query(req, |values| {
            let current = values.get(&self.name).map(str::to_string);
            match (self.op, current) {
                (QueryOp::Add, None) | (QueryOp::Replace, Some(_)) => {
                    values.set(&self.name, resolve_placeholder(&self.value, ctx));
                }
                (QueryOp::Delete, Some(_)) => values.remove(&self.name),
                (QueryOp::Copy, Some(current)) => values.set(&self.value, current),
                (QueryOp::Move, Some(current)) => {
                    values.set(&self.value, current);
                    values.remove(&self.name);
                }
                _ => {}
            }
        })
    }
}

/// Mapping table for one query field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesMap {
    pub field: String,
    #[serde(default)]
    pub mapping: HashMap<String, String>,
}

/// Rewrites present query values through their mapping tables.
#[derive(Debug, Clone, Default)]
pub struct ValuesMapModifier {
    maps: Vec<ValuesMap>,
}

impl ValuesMapModifier {
    pub fn new(maps: Vec<ValuesMap>) -> Self {
        Self { maps }
    }

    pub fn into_stage(self) -> Stage {
        Stage::new().with_request(Arc::new(self))
    }
}

#[async_trait]
impl RequestModifier for ValuesMapModifier {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        _ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!("querystring.ValuesMap.ModifyRequest: {}", req.uri());

        rewrite_query(req, |values| {
            for map in &self.maps {
                let mapped = values
                    .get(&map.field)
                    .and_then(|current| map.mapping.get(current))
                    .cloned();
                if let Some(mapped) = mapped {
                    values.set(&map.field, mapped);
                }
            }
        })
    }
}
