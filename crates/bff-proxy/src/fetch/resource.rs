//! Single auxiliary JSON resource.

use crate::body::{decode_or_null, merge_bytes, PatchError};
use crate::context::{expand_placeholders, ContextStore, RequestContext};
use crate::error::ModifierError;
use crate::modifier::{ResponseModifier, Stage};
use crate::proxy::{
    FetchError, JsonHeadersExt, ProxyRequest, ProxyResponse, ReplaceBody, RequestInfo,
    UpstreamClient, APPLICATION_JSON, DEFAULT_FETCH_TIMEOUT,
};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{HeaderName, ACCEPT};
use hyper::{Method, Request};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How a fetched body lands in the primary response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeBehavior {
    /// The fetched body becomes the response body.
    #[default]
    Replace,
    /// The fetched body is merge-patched onto the response body.
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid behavior {0:?}, expected \"replace\" or \"merge\"")]
pub struct InvalidBehavior(pub String);

impl FromStr for MergeBehavior {
    type Err = InvalidBehavior;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "replace" => Ok(MergeBehavior::Replace),
            "merge" => Ok(MergeBehavior::Merge),
            other => Err(InvalidBehavior(other.to_string())),
        }
    }
}

impl fmt::Display for MergeBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeBehavior::Replace => f.write_str("replace"),
            MergeBehavior::Merge => f.write_str("merge"),
        }
    }
}

/// A fetched body and the instructions for splicing it into a response.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyMerger {
    body: Bytes,
    behavior: MergeBehavior,
    group: Option<String>,
}

impl BodyMerger {
    pub fn new(body: Bytes, behavior: MergeBehavior, group: Option<String>) -> Self {
        Self {
            body,
            behavior,
            group,
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn behavior(&self) -> MergeBehavior {
        self.behavior
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Compute the body that results from merging into `current`.
    pub fn merge_into(&self, current: &[u8]) -> Result<Bytes, PatchError> {
        let fetched = match &self.group {
            Some(group) => {
                let mut wrapper = Map::new();
                wrapper.insert(group.clone(), decode_or_null(&self.body)?);
                Bytes::from(
                    serde_json::to_vec(&Value::Object(wrapper))
                        .map_err(PatchError::InvalidDocument)?,
                )
            }
            None => self.body.clone(),
        };

        match self.behavior {
            MergeBehavior::Replace => Ok(fetched),
            MergeBehavior::Merge => merge_bytes(current, &fetched).map(Bytes::from),
        }
    }

    /// Merge into `res`, marking the body as JSON.
    pub fn apply(&self, res: &mut ProxyResponse) -> Result<(), ModifierError> {
        let merged = self.merge_into(res.body())?;
        res.mark_json();
        res.replace_body(merged);
        Ok(())
    }
}

/// Fetches one JSON resource and turns it into a [`BodyMerger`].
///
/// The resource URL may contain `:name` tokens, expanded from the context of
/// the downstream request. Headers listed in `allowed_headers` are copied
/// from the downstream request.
#[derive(Clone)]
pub struct ResourceFetcher {
    url: String,
    method: Method,
    behavior: MergeBehavior,
    group: Option<String>,
    allowed_headers: Vec<HeaderName>,
    modifier: Stage,
    client: Arc<dyn UpstreamClient>,
    timeout: Duration,
}

impl ResourceFetcher {
    /// `GET` with `replace` behavior and the default timeout.
    pub fn new(client: Arc<dyn UpstreamClient>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            behavior: MergeBehavior::Replace,
            group: None,
            allowed_headers: Vec::new(),
            modifier: Stage::default(),
            client,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn behavior(mut self, behavior: MergeBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.group = (!group.is_empty()).then_some(group);
        self
    }

    pub fn allowed_headers(mut self, headers: Vec<HeaderName>) -> Self {
        self.allowed_headers = headers;
        self
    }

    /// Nested stage applied to the upstream request and response.
    pub fn modifier(mut self, stage: Stage) -> Self {
        self.modifier = stage;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn into_stage(self) -> Stage {
        let fetcher = Arc::new(self);
        Stage::new().with_response(fetcher)
    }

    fn build_request(
        &self,
        downstream: &RequestInfo,
        ctx: &dyn ContextStore,
    ) -> Result<ProxyRequest, FetchError> {
        let url = expand_placeholders(&self.url, ctx);

        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(url.as_str())
            .header(ACCEPT, APPLICATION_JSON.clone());

        for name in &self.allowed_headers {
            if let Some(value) = downstream.headers.get(name).filter(|v| !v.is_empty()) {
                builder = builder.header(name, value);
            }
        }

        builder
            .body(Bytes::new())
            .map_err(|source| FetchError::InvalidRequest { url, source })
    }

    /// Issue the upstream call and wrap its body.
    ///
    /// Nested response verifiers are checked against `ctx` and reset here, so
    /// a failed verification fails this fetch and nothing is left for the
    /// enclosing chain to report.
    pub async fn fetch(
        &self,
        downstream: &RequestInfo,
        ctx: &mut dyn ContextStore,
    ) -> Result<BodyMerger, FetchError> {
        let mut req = self.build_request(downstream, ctx)?;
        let url = req.uri().to_string();
        let nested = |source: ModifierError| FetchError::Modifier {
            url: url.clone(),
            source: Box::new(source),
        };

        debug!(
            "body.JSONResource.FetchResource: method({}) url({}) allowedHeaders({:?})",
            self.method, url, self.allowed_headers
        );

        self.modifier
            .modify_request(&mut req, ctx)
            .await
            .map_err(nested)?;

        let info = RequestInfo::from_request(&req);
        let response = match tokio::time::timeout(self.timeout, self.client.execute(req)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.clone(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        };

        let mut res = ProxyResponse::new(info, response);
        self.modifier
            .modify_response(&mut res, ctx)
            .await
            .map_err(nested)?;

        let verified = self.modifier.verify_responses(ctx);
        self.modifier.reset_response_verifications(ctx);
        verified.map_err(nested)?;

        Ok(BodyMerger::new(
            res.into_inner().into_body(),
            self.behavior,
            self.group.clone(),
        ))
    }
}

impl fmt::Debug for ResourceFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceFetcher")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("behavior", &self.behavior)
            .field("group", &self.group)
            .field("allowed_headers", &self.allowed_headers)
            .field("modifier", &self.modifier)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResponseModifier for ResourceFetcher {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!(
            "body.JSONResource.ModifyResponse: request: {}",
            res.request().uri
        );

        let downstream = res.request().clone();
        let mut scoped = RequestContext::snapshot(ctx);
        let merger = self.fetch(&downstream, &mut scoped).await?;
        merger.apply(res)
    }
}
