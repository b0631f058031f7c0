//! Liveness endpoint answered by the proxy itself.

use super::{RequestModifier, ResponseModifier, Stage};
use crate::context::{skip_logging, skip_round_trip, ContextStore};
use crate::error::ModifierError;
use crate::proxy::{ProxyRequest, ProxyResponse};
use async_trait::async_trait;
use hyper::{Method, StatusCode, Uri};
use std::sync::Arc;
use tracing::debug;

/// Path served by [`Healthcheck`].
pub const HEALTHCHECK_PATH: &str = "/healthz";

/// Answers `GET /healthz` with a fixed status and no upstream call.
///
/// The request phase marks the cycle to skip the round trip and the request
/// log; the host then runs the response phase on an empty response, where the
/// status is set.
#[derive(Debug, Clone, Copy)]
pub struct Healthcheck {
    status: StatusCode,
}

impl Default for Healthcheck {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl Healthcheck {
    pub fn new(status: StatusCode) -> Self {
        debug!("bff.Healthcheck.New: statusCode={}", status.as_u16());
        Self { status }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn into_stage(self) -> Stage {
        let healthcheck = Arc::new(self);
        Stage::new()
            .with_request(healthcheck.clone())
            .with_response(healthcheck)
    }
}

fn is_healthcheck(method: &Method, uri: &Uri) -> bool {
    method == Method::GET && uri.path() == HEALTHCHECK_PATH
}

#[async_trait]
impl RequestModifier for Healthcheck {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        if is_healthcheck(req.method(), req.uri()) {
            debug!("bff.Healthcheck.ModifyRequest: {}", req.uri());
            skip_round_trip(ctx);
            skip_logging(ctx);
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseModifier for Healthcheck {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        _ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        let request = res.request();
        if is_healthcheck(&request.method, &request.uri) {
            debug!("bff.Healthcheck.ModifyResponse: {}", request.uri);
            *res.status_mut() = self.status;
        }
        Ok(())
    }
}
