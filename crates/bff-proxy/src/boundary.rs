//! Outermost error boundary around a modifier chain.
//!
//! The boundary runs the wrapped chain and its verifiers for each phase and
//! folds every failure into one aggregate. Request-phase failures are returned
//! to the host, which must skip the round trip. Response-phase failures never
//! escape: the body is replaced by a JSON error document instead.
//!
//! Verification state lives in the cycle's context and is reset once per phase
//! after it has been read.

use crate::context::ContextStore;
use crate::error::{ModifierError, MultiError};
use crate::modifier::{RequestModifier, ResponseModifier, Stage};
use crate::proxy::{JsonHeadersExt, ProxyRequest, ProxyResponse, ReplaceBody};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Serialize)]
struct ErrorDocument {
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Serialize)]
struct ErrorEntry {
    message: String,
}

/// Render `{"errors":[{"message":...}, ...]}`, one entry per error.
pub fn error_document(merr: &MultiError) -> Result<Bytes, serde_json::Error> {
    let doc = ErrorDocument {
        errors: merr
            .errors()
            .iter()
            .map(|err| ErrorEntry {
                message: err.to_string(),
            })
            .collect(),
    };
    serde_json::to_vec(&doc).map(Bytes::from)
}

/// Error boundary around a built pipeline.
#[derive(Debug, Clone, Default)]
pub struct ErrorBoundary {
    inner: Stage,
    error_status: Option<StatusCode>,
}

impl ErrorBoundary {
    pub fn new(inner: Stage) -> Self {
        Self {
            inner,
            error_status: None,
        }
    }

    /// Status forced onto responses whose body was replaced by errors.
    ///
    /// Unset by default, so the upstream status is kept.
    pub fn error_status(mut self, status: StatusCode) -> Self {
        self.error_status = Some(status);
        self
    }

    pub fn inner(&self) -> &Stage {
        &self.inner
    }

    pub fn into_stage(self) -> Stage {
        let boundary = Arc::new(self);
        Stage::new()
            .with_request(boundary.clone())
            .with_response(boundary)
    }
}

#[async_trait]
impl RequestModifier for ErrorBoundary {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        let mut merr = MultiError::new();
        if let Err(err) = self.inner.modify_request(req, ctx).await {
            merr.add(err);
        }
        if let Err(err) = self.inner.verify_requests(ctx) {
            merr.add(err);
        }
        self.inner.reset_request_verifications(ctx);

        if !merr.is_empty() {
            error!("proxy.ErrorBoundary.ModifyRequest: {}", merr);
        }
        merr.into_result()
    }
}

#[async_trait]
impl ResponseModifier for ErrorBoundary {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        let mut merr = MultiError::new();
        if let Err(err) = self.inner.modify_response(res, ctx).await {
            merr.add(err);
        }
        if let Err(err) = self.inner.verify_responses(ctx) {
            merr.add(err);
        }
        self.inner.reset_response_verifications(ctx);

        if merr.is_empty() {
            return Ok(());
        }

        error!("proxy.ErrorBoundary.ModifyResponse: {}", merr);

        let body = error_document(&merr)?;
        res.mark_json();
        res.replace_body(body);
        if let Some(status) = self.error_status {
            *res.status_mut() = status;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::modifier::{Group, RequestVerifier, ResponseVerifier};
    use crate::proxy::RequestInfo;
    use crate::verify::StatusVerifier;
    use assert_json_diff::assert_json_eq;
    use hyper::header::{CONTENT_ENCODING, CONTENT_TYPE};
    use hyper::{Request, Response};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::time::Duration;

    #[derive(Default)]
    struct Scripted {
        fail_modify: bool,
        verify_failure: Option<&'static str>,
        request_resets: Mutex<usize>,
        response_resets: Mutex<usize>,
    }

    #[async_trait]
    impl RequestModifier for Scripted {
        async fn modify_request(
            &self,
            _req: &mut ProxyRequest,
            _ctx: &mut dyn ContextStore,
        ) -> Result<(), ModifierError> {
            if self.fail_modify {
                return Err(ModifierError::Verification("request rejected".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ResponseModifier for Scripted {
        async fn modify_response(
            &self,
            res: &mut ProxyResponse,
            _ctx: &mut dyn ContextStore,
        ) -> Result<(), ModifierError> {
            res.replace_body(Bytes::from_static(b"{\"partial\":true}"));
            if self.fail_modify {
                return Err(ModifierError::Verification("upstream exploded".to_string()));
            }
            Ok(())
        }
    }

    impl RequestVerifier for Scripted {
        fn verify_requests(&self, _ctx: &dyn ContextStore) -> Result<(), ModifierError> {
            match self.verify_failure {
                Some(msg) => Err(ModifierError::Verification(msg.to_string())),
                None => Ok(()),
            }
        }

        fn reset_request_verifications(&self, _ctx: &mut dyn ContextStore) {
            *self.request_resets.lock() += 1;
        }
    }

    impl ResponseVerifier for Scripted {
        fn verify_responses(&self, _ctx: &dyn ContextStore) -> Result<(), ModifierError> {
            match self.verify_failure {
                Some(msg) => Err(ModifierError::Verification(msg.to_string())),
                None => Ok(()),
            }
        }

        fn reset_response_verifications(&self, _ctx: &mut dyn ContextStore) {
            *self.response_resets.lock() += 1;
        }
    }

    fn boundary(scripted: &Arc<Scripted>) -> ErrorBoundary {
        ErrorBoundary::new(
            Stage::new()
                .with_request(scripted.clone())
                .with_response(scripted.clone())
                .with_request_verifier(scripted.clone())
                .with_response_verifier(scripted.clone()),
        )
    }

    fn response() -> ProxyResponse {
        let upstream = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_ENCODING, "gzip")
            .body(Bytes::from_static(b"upstream"))
            .unwrap();
        ProxyResponse::new(RequestInfo::default(), upstream)
    }

    fn body_json(res: &ProxyResponse) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn test_response_failure_becomes_error_document() {
        let scripted = Arc::new(Scripted {
            fail_modify: true,
            ..Default::default()
        });
        let boundary = boundary(&scripted);
        let mut ctx = RequestContext::new();
        let mut res = response();

        boundary.modify_response(&mut res, &mut ctx).await.unwrap();

        assert_json_eq!(
            body_json(&res),
            json!({"errors": [{"message": "upstream exploded"}]})
        );
        assert_eq!(res.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(res.headers().get(CONTENT_ENCODING).is_none());
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(*scripted.response_resets.lock(), 1);
    }

    #[tokio::test]
    async fn test_response_success_passes_through() {
        let scripted = Arc::new(Scripted::default());
        let boundary = boundary(&scripted);
        let mut ctx = RequestContext::new();
        let mut res = response();

        boundary.modify_response(&mut res, &mut ctx).await.unwrap();

        assert_eq!(res.body().as_ref(), b"{\"partial\":true}");
        assert_eq!(res.headers().get(CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(*scripted.response_resets.lock(), 1);
    }

    #[tokio::test]
    async fn test_modifier_and_verifier_errors_are_aggregated() {
        let scripted = Arc::new(Scripted {
            fail_modify: true,
            verify_failure: Some("status mismatch"),
            ..Default::default()
        });
        let boundary = boundary(&scripted).error_status(StatusCode::BAD_GATEWAY);
        let mut ctx = RequestContext::new();
        let mut res = response();

        boundary.modify_response(&mut res, &mut ctx).await.unwrap();

        assert_json_eq!(
            body_json(&res),
            json!({"errors": [
                {"message": "upstream exploded"},
                {"message": "status mismatch"}
            ]})
        );
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_request_failure_propagates_and_resets() {
        let scripted = Arc::new(Scripted {
            fail_modify: true,
            verify_failure: Some("missing auth"),
            ..Default::default()
        });
        let boundary = boundary(&scripted);
        let mut ctx = RequestContext::new();
        let mut req = Request::new(Bytes::new());

        let err = boundary.modify_request(&mut req, &mut ctx).await.unwrap_err();

        assert_eq!(err.to_string(), "request rejected\nmissing auth");
        assert_eq!(*scripted.request_resets.lock(), 1);
        assert_eq!(*scripted.response_resets.lock(), 0);
    }

    #[tokio::test]
    async fn test_request_success_still_resets() {
        let scripted = Arc::new(Scripted::default());
        let boundary = boundary(&scripted);
        let mut ctx = RequestContext::new();
        let mut req = Request::new(Bytes::new());

        boundary.modify_request(&mut req, &mut ctx).await.unwrap();
        assert_eq!(*scripted.request_resets.lock(), 1);
    }

    /// Stalls responses that did not come back with 200.
    struct SlowOnError;

    #[async_trait]
    impl ResponseModifier for SlowOnError {
        async fn modify_response(
            &self,
            res: &mut ProxyResponse,
            _ctx: &mut dyn ContextStore,
        ) -> Result<(), ModifierError> {
            if res.status() != StatusCode::OK {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(())
        }
    }

    fn upstream(uri: &str, status: StatusCode) -> ProxyResponse {
        let req = Request::get(uri).body(()).unwrap();
        let mut res = Response::new(Bytes::from_static(br#"{"ok":true}"#));
        *res.status_mut() = status;
        ProxyResponse::new(RequestInfo::from_request(&req), res)
    }

    #[tokio::test]
    async fn test_concurrent_responses_keep_their_own_verifications() {
        let mut group = Group::new(false);
        group.push(StatusVerifier::new(StatusCode::OK).into_stage());
        group.push(Stage::new().with_response(Arc::new(SlowOnError)));
        let stage = ErrorBoundary::new(group.into_stage()).into_stage();

        let failing = async {
            let mut ctx = RequestContext::new();
            let mut res = upstream("http://api.test/a", StatusCode::INTERNAL_SERVER_ERROR);
            stage.modify_response(&mut res, &mut ctx).await.unwrap();
            res
        };
        let healthy = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut ctx = RequestContext::new();
            let mut res = upstream("http://api.test/b", StatusCode::OK);
            stage.modify_response(&mut res, &mut ctx).await.unwrap();
            res
        };
        let (failed, ok) = tokio::join!(failing, healthy);

        assert_json_eq!(
            body_json(&failed),
            json!({"errors": [{
                "message": "response(http://api.test/a) status code verify failure: got 500, want 200"
            }]})
        );
        assert_eq!(ok.status(), StatusCode::OK);
        assert_json_eq!(body_json(&ok), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_verifications_are_cleared_after_each_phase() {
        let stage = ErrorBoundary::new(StatusVerifier::new(StatusCode::OK).into_stage());
        let mut ctx = RequestContext::new();

        let mut failed = upstream("http://api.test/a", StatusCode::BAD_GATEWAY);
        stage.modify_response(&mut failed, &mut ctx).await.unwrap();
        assert!(body_json(&failed)["errors"].is_array());

        let mut ok = upstream("http://api.test/b", StatusCode::OK);
        stage.modify_response(&mut ok, &mut ctx).await.unwrap();
        assert_json_eq!(body_json(&ok), json!({"ok": true}));
    }

    #[test]
    fn test_error_document_shape() {
        let mut merr = MultiError::new();
        merr.add(ModifierError::InvalidUri("::".to_string()));
        let doc = error_document(&merr).unwrap();
        assert_eq!(doc.as_ref(), br#"{"errors":[{"message":"invalid URI: ::"}]}"#);
    }
}
