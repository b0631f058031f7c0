//! End-to-end pipeline tests driven from configuration.
//!
//! Auxiliary resources are served by an in-memory upstream so every scenario
//! is deterministic.

use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use bff_proxy::context;
use bff_proxy::proxy::FetchError;
use bff_proxy::{
    Builder, PipelineConfig, ProxyRequest, ProxyResponse, RequestContext, RequestInfo, Stage,
    UpstreamClient,
};
use bytes::Bytes;
use hyper::{Request, Response, StatusCode};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Serves canned bodies by exact URL and records every request URI.
#[derive(Default)]
struct CannedUpstream {
    routes: HashMap<String, (StatusCode, &'static str)>,
    seen: Mutex<Vec<String>>,
}

impl CannedUpstream {
    fn route(mut self, url: &str, status: StatusCode, body: &'static str) -> Self {
        self.routes.insert(url.to_string(), (status, body));
        self
    }
}

#[async_trait]
impl UpstreamClient for CannedUpstream {
    async fn execute(&self, req: ProxyRequest) -> Result<Response<Bytes>, FetchError> {
        let url = req.uri().to_string();
        self.seen.lock().push(url.clone());

        let (status, body) = self
            .routes
            .get(&url)
            .copied()
            .unwrap_or((StatusCode::NOT_FOUND, ""));
        let mut res = Response::new(Bytes::from_static(body.as_bytes()));
        *res.status_mut() = status;
        Ok(res)
    }
}

const ORDER_PIPELINE: &str = r#"
errorStatusCode: 502
modifier:
  fifo.Group:
    aggregateErrors: true
    modifiers:
      - querystring.Modifier:
          scope: [request]
          op: add
          name: source
          value: bff
      - url.Filter:
          path: /orders/:orderId
          modifier:
            fifo.Group:
              modifiers:
                - body.MultiFetcher:
                    resources:
                      - body.JSONResource:
                          url: http://orders.internal/orders/:orderId
                      - body.JSONResource:
                          url: http://users.internal/users/7
                          behavior: merge
                          group: customer
                          modifier:
                            fifo.Group:
                              modifiers:
                                - status.Verifier:
                                    statusCode: 200
                                - body.JSONPatch:
                                    scope: [response]
                                    patch:
                                      - op: remove
                                        path: /password
                - status.Filter:
                    scope: [response]
                    statusCode: 200
                    modifier:
                      body.JSONMapPatch:
                        path: /items
                        patch:
                          - op: remove
                            path: /sku
"#;

const ORDER: &str = r#"{"id":"A1","items":[{"sku":"x","qty":1},{"sku":"y","qty":2}]}"#;

const FAILED_USER: &str = r#"{"password":"","error":"database unavailable"}"#;

fn pipeline(upstream: Arc<CannedUpstream>) -> Stage {
    let config = PipelineConfig::from_yaml(ORDER_PIPELINE).unwrap();
    Builder::new(upstream)
        .build_pipeline(&config)
        .unwrap()
        .into_stage()
}

/// Run both phases the way a host runtime would.
async fn round_trip(stage: &Stage, uri: &str, upstream_body: &'static str) -> ProxyResponse {
    let mut ctx = RequestContext::new();
    let mut req = Request::get(uri).body(Bytes::new()).unwrap();
    stage.modify_request(&mut req, &mut ctx).await.unwrap();

    let mut res = ProxyResponse::new(
        RequestInfo::from_request(&req),
        Response::new(Bytes::from_static(upstream_body.as_bytes())),
    );
    stage.modify_response(&mut res, &mut ctx).await.unwrap();
    res
}

fn body_json(res: &ProxyResponse) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

#[tokio::test]
async fn test_order_page_is_composed() {
    let upstream = Arc::new(
        CannedUpstream::default()
            .route("http://orders.internal/orders/A1", StatusCode::OK, ORDER)
            .route(
                "http://users.internal/users/7",
                StatusCode::OK,
                r#"{"name":"Ada","password":"hunter2"}"#,
            ),
    );
    let stage = pipeline(upstream.clone());

    let res = round_trip(&stage, "http://bff.test/orders/A1", "{}").await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.request().uri.query(), Some("source=bff"));
    assert_json_eq!(
        body_json(&res),
        json!({
            "id": "A1",
            "items": [{"qty": 1}, {"qty": 2}],
            "customer": {"name": "Ada"}
        })
    );

    let mut seen = upstream.seen.lock().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            "http://orders.internal/orders/A1".to_string(),
            "http://users.internal/users/7".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_unmatched_path_skips_fetching() {
    let upstream = Arc::new(CannedUpstream::default());
    let stage = pipeline(upstream.clone());

    let res = round_trip(&stage, "http://bff.test/health", r#"{"ok":true}"#).await;

    assert_json_eq!(body_json(&res), json!({"ok": true}));
    assert!(upstream.seen.lock().is_empty());
}

#[tokio::test]
async fn test_failed_resource_yields_error_document() {
    let upstream = Arc::new(
        CannedUpstream::default()
            .route("http://orders.internal/orders/A1", StatusCode::OK, ORDER)
            .route("http://users.internal/users/7", StatusCode::INTERNAL_SERVER_ERROR, FAILED_USER),
    );
    let stage = pipeline(upstream);

    let res = round_trip(&stage, "http://bff.test/orders/A1", r#"{"primary":true}"#).await;

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(&res);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    let message = errors[0]["message"].as_str().unwrap();
    assert!(message.contains("http://users.internal/users/7"));
    assert!(message.contains("got 500, want 200"));
}

#[tokio::test]
async fn test_pipeline_is_reusable_after_failure() {
    let upstream = Arc::new(
        CannedUpstream::default()
            .route("http://orders.internal/orders/A1", StatusCode::OK, ORDER)
            .route("http://users.internal/users/7", StatusCode::INTERNAL_SERVER_ERROR, FAILED_USER),
    );
    let stage = pipeline(upstream);

    let failed = round_trip(&stage, "http://bff.test/orders/A1", "{}").await;
    assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);

    // verifier state from the failed round trip must not leak
    let res = round_trip(&stage, "http://bff.test/health", r#"{"ok":true}"#).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_json_eq!(body_json(&res), json!({"ok": true}));
}

#[tokio::test]
async fn test_request_phase_failure_is_returned() {
    let config = PipelineConfig::from_yaml(
        r#"
modifier:
  body.JSONPatch:
    scope: [request]
    patch:
      - op: test
        path: /kind
        value: order
      - op: add
        path: /checked
        value: true
"#,
    )
    .unwrap();
    let stage = Builder::new(Arc::new(CannedUpstream::default()))
        .build_pipeline(&config)
        .unwrap()
        .into_stage();

    let mut ctx = RequestContext::new();
    let mut req = Request::post("http://bff.test/submit")
        .body(Bytes::from_static(br#"{"kind":"user"}"#))
        .unwrap();
    let err = stage.modify_request(&mut req, &mut ctx).await.unwrap_err();

    assert!(err.to_string().contains("test operation failed at /kind"));
    assert_eq!(req.body().as_ref(), br#"{"kind":"user"}"#);

    let mut ok = Request::post("http://bff.test/submit")
        .body(Bytes::from_static(br#"{"kind":"order"}"#))
        .unwrap();
    stage.modify_request(&mut ok, &mut ctx).await.unwrap();
    assert_json_eq!(
        serde_json::from_slice::<Value>(ok.body()).unwrap(),
        json!({"kind": "order", "checked": true})
    );
}

#[tokio::test]
async fn test_concurrent_round_trips_do_not_share_failures() {
    let upstream = Arc::new(
        CannedUpstream::default()
            .route("http://orders.internal/orders/A1", StatusCode::OK, ORDER)
            .route("http://users.internal/users/7", StatusCode::INTERNAL_SERVER_ERROR, FAILED_USER),
    );
    let stage = pipeline(upstream);

    let (failed, healthy) = tokio::join!(
        round_trip(&stage, "http://bff.test/orders/A1", "{}"),
        round_trip(&stage, "http://bff.test/health", r#"{"ok":true}"#),
    );

    assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(&failed)["errors"].as_array().unwrap().len(), 1);
    assert_eq!(healthy.status(), StatusCode::OK);
    assert_json_eq!(body_json(&healthy), json!({"ok": true}));
}

#[tokio::test]
async fn test_healthcheck_is_answered_without_upstream() {
    let config = PipelineConfig::from_yaml(
        r#"
modifier:
  fifo.Group:
    modifiers:
      - bff.Healthcheck:
          statusCode: 204
      - log.Logger: {}
"#,
    )
    .unwrap();
    let stage = Builder::new(Arc::new(CannedUpstream::default()))
        .build_pipeline(&config)
        .unwrap()
        .into_stage();

    let mut ctx = RequestContext::new();
    let mut req = Request::get("http://bff.test/healthz").body(Bytes::new()).unwrap();
    stage.modify_request(&mut req, &mut ctx).await.unwrap();
    assert!(context::round_trip_skipped(&ctx));

    // the host answers from an empty response instead of calling upstream
    let mut res = ProxyResponse::new(RequestInfo::from_request(&req), Response::new(Bytes::new()));
    stage.modify_response(&mut res, &mut ctx).await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let other = round_trip(&stage, "http://bff.test/orders/A1", "{}").await;
    assert_eq!(other.status(), StatusCode::OK);
}
