//! Builds runnable stages from modifier records.

use super::modifiers::{scope_flags, ModifierConfig, ResourceConfig};
use super::{ConfigError, PipelineConfig};
use crate::body::{JsonMapPatchModifier, JsonPatchModifier};
use crate::boundary::ErrorBoundary;
use crate::fetch::{MergeBehavior, MultiFetcher, ResourceFetcher};
use crate::filter::Filter;
use crate::modifier::{Group, Healthcheck, Logger, Stage};
use crate::predicate::{PathPattern, UrlMatcher};
use crate::proxy::{HttpUpstream, UpstreamClient, DEFAULT_FETCH_TIMEOUT};
use crate::querystring::{QueryOp, QueryStringModifier, ValuesMapModifier};
use crate::verify::StatusVerifier;
use hyper::header::HeaderName;
use hyper::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Turns [`ModifierConfig`] trees into [`Stage`]s.
///
/// Every auxiliary resource built here shares one upstream client.
#[derive(Clone)]
pub struct Builder {
    client: Arc<dyn UpstreamClient>,
    timeout: Duration,
}

impl Builder {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Builder backed by [`HttpUpstream`] with the configured timeout.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let timeout = Duration::from_secs(config.http.timeout_secs);
        let client = HttpUpstream::new(timeout)?;
        Ok(Self::new(Arc::new(client)).timeout(timeout))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the root modifier wrapped in an [`ErrorBoundary`].
    pub fn build_pipeline(&self, config: &PipelineConfig) -> Result<ErrorBoundary, ConfigError> {
        let mut boundary = ErrorBoundary::new(self.build(&config.modifier)?);
        if let Some(code) = config.error_status_code {
            boundary = boundary.error_status(status_code(code)?);
        }
        Ok(boundary)
    }

    pub fn build(&self, config: &ModifierConfig) -> Result<Stage, ConfigError> {
        let stage = match config {
            ModifierConfig::Group(c) => {
                let mut group = Group::new(c.aggregate_errors);
                for modifier in &c.modifiers {
                    group.push(self.build(modifier)?);
                }
                group.into_stage()
            }
            ModifierConfig::UrlFilter(c) => {
                let mut matcher = UrlMatcher::new()
                    .scheme(&c.scheme)
                    .host(&c.host)
                    .query(&c.query)
                    .fragment(&c.fragment);
                if !c.path.is_empty() {
                    matcher = matcher.path(PathPattern::compile(&c.path)?);
                }
                Filter::url(matcher)
                    .when_true(self.build_optional(c.modifier.as_deref())?)
                    .when_false(self.build_optional(c.else_modifier.as_deref())?)
                    .into_stage()
            }
            ModifierConfig::StatusFilter(c) => Filter::status(status_code(c.status_code)?)
                .when_true(self.build_optional(c.modifier.as_deref())?)
                .when_false(self.build_optional(c.else_modifier.as_deref())?)
                .into_stage(),
            ModifierConfig::StatusVerifier(c) => {
                StatusVerifier::new(status_code(c.status_code)?).into_stage()
            }
            ModifierConfig::JsonPatch(c) => {
                JsonPatchModifier::new(c.patch.clone(), c.options).into_stage()
            }
            ModifierConfig::JsonMapPatch(c) => {
                JsonMapPatchModifier::new(c.patch.clone(), c.options, c.path.as_str()).into_stage()
            }
            ModifierConfig::JsonResource(c) => self.resource(c)?.into_stage(),
            ModifierConfig::MultiFetcher(c) => {
                // resources run only inside the fan-out and carry no scope
                let fetchers = c
                    .resources
                    .iter()
                    .map(|entry| {
                        let resource = entry.config();
                        if !resource.scope.is_empty() {
                            return Err(ConfigError::ResourceScope(resource.url.clone()));
                        }
                        self.resource(resource)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                MultiFetcher::new(fetchers).into_stage()
            }
            ModifierConfig::QueryString(c) => {
                let op: QueryOp = c.op.parse()?;
                QueryStringModifier::new(op, c.name.as_str(), c.value.as_str()).into_stage()
            }
            ModifierConfig::ValuesMap(c) => ValuesMapModifier::new(c.maps.clone()).into_stage(),
            ModifierConfig::Logger(_) => {
                let logger = Arc::new(Logger::new());
                Stage::new().with_request(logger.clone()).with_response(logger)
            }
            ModifierConfig::Healthcheck(c) => {
                let status = match c.status_code {
                    0 => StatusCode::OK,
                    code => status_code(code)?,
                };
                Healthcheck::new(status).into_stage()
            }
        };

        let (request, response) = scope_flags(config.scope());
        debug!(
            "Built {} (request: {}, response: {})",
            config.kind(),
            request,
            response
        );
        Ok(stage.scoped(request, response))
    }

    fn build_optional(&self, config: Option<&ModifierConfig>) -> Result<Stage, ConfigError> {
        match config {
            Some(config) => self.build(config),
            None => Ok(Stage::default()),
        }
    }

    fn resource(&self, config: &ResourceConfig) -> Result<ResourceFetcher, ConfigError> {
        if config.url.is_empty() {
            return Err(ConfigError::MissingUrl("body.JSONResource"));
        }

        let mut fetcher = ResourceFetcher::new(self.client.clone(), config.url.as_str())
            .behavior(config.behavior.parse::<MergeBehavior>()?)
            .group(config.group.as_str())
            .timeout(self.timeout);

        if !config.method.is_empty() {
            let method = Method::from_bytes(config.method.to_ascii_uppercase().as_bytes())
                .map_err(|_| ConfigError::InvalidMethod(config.method.clone()))?;
            fetcher = fetcher.method(method);
        }

        let headers = config
            .allowed_headers
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| ConfigError::InvalidHeader(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        fetcher = fetcher.allowed_headers(headers);

        if let Some(nested) = config.modifier.as_deref() {
            fetcher = fetcher.modifier(self.build(nested)?);
        }
        Ok(fetcher)
    }
}

fn status_code(code: u16) -> Result<StatusCode, ConfigError> {
    StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatus(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::fetch::testing::StubUpstream;
    use crate::proxy::{ProxyResponse, RequestInfo};
    use assert_json_diff::assert_json_eq;
    use bytes::Bytes;
    use hyper::{Request, Response};
    use serde_json::{json, Value};

    fn builder(stub: StubUpstream) -> Builder {
        Builder::new(Arc::new(stub))
    }

    fn parse(value: Value) -> ModifierConfig {
        serde_json::from_value(value).unwrap()
    }

    fn response(uri: &str, status: StatusCode, body: &'static str) -> ProxyResponse {
        let req = Request::get(uri).body(Bytes::new()).unwrap();
        let mut upstream = Response::new(Bytes::from_static(body.as_bytes()));
        *upstream.status_mut() = status;
        ProxyResponse::new(RequestInfo::from_request(&req), upstream)
    }

    #[tokio::test]
    async fn test_status_filter_patch_only_on_match() {
        let stage = builder(StubUpstream::new())
            .build(&parse(json!({
                "status.Filter": {
                    "statusCode": 200,
                    "modifier": {"body.JSONPatch": {"patch": [
                        {"op": "add", "path": "/seen", "value": true}
                    ]}}
                }
            })))
            .unwrap();

        let mut ctx = RequestContext::new();
        let mut ok = response("http://api.test/", StatusCode::OK, "{}");
        stage.modify_response(&mut ok, &mut ctx).await.unwrap();
        assert_json_eq!(
            serde_json::from_slice::<Value>(ok.body()).unwrap(),
            json!({"seen": true})
        );

        let mut missing = response("http://api.test/", StatusCode::NOT_FOUND, "{}");
        stage.modify_response(&mut missing, &mut ctx).await.unwrap();
        assert_eq!(missing.body().as_ref(), b"{}");
    }

    #[test]
    fn test_scope_drops_unselected_phase() {
        let stage = builder(StubUpstream::new())
            .build(&parse(json!({
                "body.JSONPatch": {
                    "scope": ["request"],
                    "patch": [{"op": "add", "path": "/x", "value": 1}]
                }
            })))
            .unwrap();

        assert!(stage.request.is_some());
        assert!(stage.response.is_none());
    }

    #[tokio::test]
    async fn test_url_filter_binds_params_for_resource() {
        let stub = StubUpstream::new().route("http://users.internal/u/42", r#"{"name":"Ada"}"#);
        let builder = builder(stub);
        let stage = builder
            .build(&parse(json!({
                "url.Filter": {
                    "path": "/users/:id",
                    "modifier": {"body.JSONResource": {
                        "url": "http://users.internal/u/:id",
                        "behavior": "merge",
                        "group": "user"
                    }}
                }
            })))
            .unwrap();

        let mut ctx = RequestContext::new();
        let mut res = response("http://api.test/users/42", StatusCode::OK, r#"{"id":42}"#);
        stage.modify_response(&mut res, &mut ctx).await.unwrap();

        assert_json_eq!(
            serde_json::from_slice::<Value>(res.body()).unwrap(),
            json!({"id": 42, "user": {"name": "Ada"}})
        );
    }

    #[test]
    fn test_invalid_records_are_rejected() {
        let b = builder(StubUpstream::new());

        let err = b
            .build(&parse(json!({"status.Verifier": {"statusCode": 42}})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStatus(42)));

        let err = b
            .build(&parse(json!({"body.JSONResource": {"url": "http://a/", "behavior": "append"}})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Behavior(_)));

        let err = b
            .build(&parse(json!({"querystring.Modifier": {"name": "a", "op": "upsert"}})))
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown query string operation \"upsert\"");

        let err = b
            .build(&parse(json!({"url.Filter": {"path": "/a/:id/b/:id"}})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Pattern(_)));

        let err = b
            .build(&parse(json!({"body.JSONResource": {"url": ""}})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingUrl(_)));

        let err = b
            .build(&parse(json!({"body.JSONResource": {
                "url": "http://a/",
                "allowedHeaders": ["bad header"]
            }})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeader(_)));

        let err = b
            .build(&parse(json!({"body.MultiFetcher": {"resources": [
                {"body.JSONResource": {"url": "http://a/"}},
                {"body.JSONResource": {"url": "http://b/", "scope": ["request"]}}
            ]}})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ResourceScope(ref url) if url == "http://b/"));
    }

    #[tokio::test]
    async fn test_healthcheck_record() {
        let b = builder(StubUpstream::new());
        let stage = b
            .build(&parse(json!({"bff.Healthcheck": {"statusCode": 503}})))
            .unwrap();

        let mut ctx = RequestContext::new();
        let mut req = Request::get("http://bff.test/healthz").body(Bytes::new()).unwrap();
        stage.modify_request(&mut req, &mut ctx).await.unwrap();
        assert!(crate::context::round_trip_skipped(&ctx));

        let mut res = response("http://bff.test/healthz", StatusCode::OK, "");
        stage.modify_response(&mut res, &mut ctx).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let stage = b.build(&parse(json!({"bff.Healthcheck": {}}))).unwrap();
        let mut res = response("http://bff.test/healthz", StatusCode::BAD_GATEWAY, "");
        stage.modify_response(&mut res, &mut ctx).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_pipeline_error_status() {
        let config = PipelineConfig::from_yaml(
            "errorStatusCode: 502\nmodifier:\n  status.Verifier:\n    statusCode: 200\n",
        )
        .unwrap();
        let boundary = builder(StubUpstream::new()).build_pipeline(&config).unwrap();
        let stage = boundary.into_stage();

        let mut ctx = RequestContext::new();
        let mut res = response("http://api.test/", StatusCode::NOT_FOUND, "nope");
        stage.modify_response(&mut res, &mut ctx).await.unwrap();

        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_json_eq!(
            body,
            json!({"errors": [{
                "message": "response(http://api.test/) status code verify failure: got 404, want 200"
            }]})
        );
    }
}
