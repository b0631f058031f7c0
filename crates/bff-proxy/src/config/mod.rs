//! Pipeline configuration.
//!
//! # Module Structure
//!
//! - `modifiers` - Declarative modifier records, one variant per modifier kind
//! - `builder` - Turns records into a runnable [`Stage`](crate::modifier::Stage)

mod builder;
mod modifiers;

pub use builder::Builder;
pub use modifiers::{
    scope_flags, GroupConfig, JsonMapPatchConfig, JsonPatchConfig, LoggerConfig,
    ModifierConfig, MultiFetcherConfig, QueryStringConfig, ResourceConfig, ResourceEntry,
    ScopeKind, StatusFilterConfig, StatusVerifierConfig, UrlFilterConfig, ValuesMapConfig,
};

use crate::boundary::ErrorBoundary;
use crate::fetch::InvalidBehavior;
use crate::predicate::PatternError;
use crate::proxy::FetchError;
use crate::querystring::InvalidQueryOp;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors raised while turning records into modifiers.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Behavior(#[from] InvalidBehavior),

    #[error(transparent)]
    QueryOp(#[from] InvalidQueryOp),

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("invalid header name {0:?}")]
    InvalidHeader(String),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("{0} requires a url")]
    MissingUrl(&'static str),

    #[error("resource {0} in body.MultiFetcher must not set a scope")]
    ResourceScope(String),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] FetchError),
}

/// Top-level pipeline file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub http: HttpConfig,

    /// Status set on responses replaced by the error document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_status_code: Option<u16>,

    /// Root modifier of the chain.
    pub modifier: ModifierConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Per-fetch timeout for auxiliary resources.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML (or JSON) file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let config: PipelineConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings that the record types cannot express.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeoutSecs must be greater than zero");
        }
        if let Some(code) = self.error_status_code {
            StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatus(code))?;
        }
        Ok(())
    }

    /// Build the pipeline against a real HTTP upstream.
    pub fn build(&self) -> Result<ErrorBoundary, ConfigError> {
        Builder::from_config(self)?.build_pipeline(self)
    }
}
