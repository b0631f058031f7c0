//! Declarative modifier records.
//!
//! Each record is keyed by its modifier kind, e.g.
//!
//! ```yaml
//! status.Filter:
//!   statusCode: 200
//!   modifier:
//!     body.JSONPatch:
//!       patch:
//!         - { op: remove, path: /internal }
//! ```

use crate::body::{ApplyOptions, Patch};
use crate::querystring::ValuesMap;
use serde::{Deserialize, Serialize};

/// Phase a record participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Request,
    Response,
}

/// `(request, response)` flags for a scope list; an empty list means both.
pub fn scope_flags(scope: &[ScopeKind]) -> (bool, bool) {
    if scope.is_empty() {
        return (true, true);
    }
    (
        scope.contains(&ScopeKind::Request),
        scope.contains(&ScopeKind::Response),
    )
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ModifierConfig {
    #[serde(rename = "fifo.Group")]
    Group(GroupConfig),

    #[serde(rename = "url.Filter")]
    UrlFilter(UrlFilterConfig),

    #[serde(rename = "status.Filter")]
    StatusFilter(StatusFilterConfig),

    #[serde(rename = "status.Verifier")]
    StatusVerifier(StatusVerifierConfig),

    #[serde(rename = "body.JSONPatch")]
    JsonPatch(JsonPatchConfig),

    #[serde(rename = "body.JSONMapPatch")]
    JsonMapPatch(JsonMapPatchConfig),

    #[serde(rename = "body.JSONResource")]
    JsonResource(ResourceConfig),

    #[serde(rename = "body.MultiFetcher")]
    MultiFetcher(MultiFetcherConfig),

    #[serde(rename = "querystring.Modifier")]
    QueryString(QueryStringConfig),

    #[serde(rename = "querystring.ValuesMap")]
    ValuesMap(ValuesMapConfig),

    #[serde(rename = "log.Logger")]
    Logger(LoggerConfig),

    #[serde(rename = "bff.Healthcheck")]
    Healthcheck(HealthcheckConfig),
}

impl ModifierConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ModifierConfig::Group(_) => "fifo.Group",
            ModifierConfig::UrlFilter(_) => "url.Filter",
            ModifierConfig::StatusFilter(_) => "status.Filter",
            ModifierConfig::StatusVerifier(_) => "status.Verifier",
            ModifierConfig::JsonPatch(_) => "body.JSONPatch",
            ModifierConfig::JsonMapPatch(_) => "body.JSONMapPatch",
            ModifierConfig::JsonResource(_) => "body.JSONResource",
            ModifierConfig::MultiFetcher(_) => "body.MultiFetcher",
            ModifierConfig::QueryString(_) => "querystring.Modifier",
            ModifierConfig::ValuesMap(_) => "querystring.ValuesMap",
            ModifierConfig::Logger(_) => "log.Logger",
            ModifierConfig::Healthcheck(_) => "bff.Healthcheck",
        }
    }

    pub fn scope(&self) -> &[ScopeKind] {
        match self {
            ModifierConfig::Group(c) => &c.scope,
            ModifierConfig::UrlFilter(c) => &c.scope,
            ModifierConfig::StatusFilter(c) => &c.scope,
            ModifierConfig::StatusVerifier(c) => &c.scope,
            ModifierConfig::JsonPatch(c) => &c.scope,
            ModifierConfig::JsonMapPatch(c) => &c.scope,
            ModifierConfig::JsonResource(c) => &c.scope,
            ModifierConfig::MultiFetcher(c) => &c.scope,
            ModifierConfig::QueryString(c) => &c.scope,
            ModifierConfig::ValuesMap(c) => &c.scope,
            ModifierConfig::Logger(c) => &c.scope,
            ModifierConfig::Healthcheck(c) => &c.scope,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    #[serde(default)]
    pub aggregate_errors: bool,
    #[serde(default)]
    pub modifiers: Vec<ModifierConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlFilterConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub fragment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<Box<ModifierConfig>>,
    #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_modifier: Option<Box<ModifierConfig>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFilterConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<Box<ModifierConfig>>,
    #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_modifier: Option<Box<ModifierConfig>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusVerifierConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    pub status_code: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPatchConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    pub patch: Patch,
    #[serde(flatten)]
    pub options: ApplyOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonMapPatchConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    pub patch: Patch,
    #[serde(default)]
    pub path: String,
    #[serde(flatten)]
    pub options: ApplyOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    pub url: String,
    /// Defaults to `GET`.
    #[serde(default)]
    pub method: String,
    /// `replace` (default) or `merge`.
    #[serde(default)]
    pub behavior: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<Box<ModifierConfig>>,
}

/// A multi-fetcher resource, either keyed (`body.JSONResource: {...}`) or bare.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ResourceEntry {
    Keyed {
        #[serde(rename = "body.JSONResource")]
        resource: ResourceConfig,
    },
    Bare(ResourceConfig),
}

impl ResourceEntry {
    pub fn config(&self) -> &ResourceConfig {
        match self {
            ResourceEntry::Keyed { resource } | ResourceEntry::Bare(resource) => resource,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiFetcherConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStringConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    pub name: String,
    #[serde(default)]
    pub value: String,
    pub op: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesMapConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    #[serde(default)]
    pub maps: Vec<ValuesMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthcheckConfig {
    #[serde(default)]
    pub scope: Vec<ScopeKind>,
    /// Status answered on `GET /healthz`; 0 means 200.
    #[serde(default)]
    pub status_code: u16,
}
