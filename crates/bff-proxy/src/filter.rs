//! Conditional dispatch between two stages.

use crate::context::ContextStore;
use crate::error::{ModifierError, MultiError};
use crate::modifier::{
    RequestModifier, RequestVerifier, ResponseModifier, ResponseVerifier, Stage,
};
use crate::predicate::{Condition, StatusMatcher, UrlMatcher};
use crate::proxy::{ProxyRequest, ProxyResponse};
use async_trait::async_trait;
use hyper::StatusCode;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Runs `when_true` or `when_false` depending on a condition.
///
/// The condition is evaluated independently for each phase. Empty branches are
/// successful no-ops. The filter itself never mutates the message.
#[derive(Clone)]
pub struct Filter {
    condition: Arc<dyn Condition>,
    when_true: Stage,
    when_false: Stage,
}

impl Filter {
    pub fn new(condition: Arc<dyn Condition>) -> Self {
        Self {
            condition,
            when_true: Stage::default(),
            when_false: Stage::default(),
        }
    }

    /// Filter on an exact response status.
    pub fn status(status: StatusCode) -> Self {
        Self::new(Arc::new(StatusMatcher::new(status)))
    }

    /// Filter on the request URL.
    pub fn url(matcher: UrlMatcher) -> Self {
        Self::new(Arc::new(matcher))
    }

    pub fn when_true(mut self, stage: Stage) -> Self {
        self.when_true = stage;
        self
    }

    pub fn when_false(mut self, stage: Stage) -> Self {
        self.when_false = stage;
        self
    }

    pub fn into_stage(self) -> Stage {
        let filter = Arc::new(self);
        Stage::new()
            .with_request(filter.clone())
            .with_response(filter.clone())
            .with_request_verifier(filter.clone())
            .with_response_verifier(filter)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("when_true", &self.when_true)
            .field("when_false", &self.when_false)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestModifier for Filter {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        if self.condition.match_request(req, ctx) {
            debug!("Filter matched request: {}", req.uri());
            self.when_true.modify_request(req, ctx).await
        } else {
            self.when_false.modify_request(req, ctx).await
        }
    }
}

#[async_trait]
impl ResponseModifier for Filter {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        if self.condition.match_response(res, ctx) {
            debug!(
                "Filter matched response: {} {}",
                res.status(),
                res.request().uri
            );
            self.when_true.modify_response(res, ctx).await
        } else {
            self.when_false.modify_response(res, ctx).await
        }
    }
}

impl RequestVerifier for Filter {
    fn verify_requests(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError> {
        let mut merr = MultiError::new();
        for stage in [&self.when_true, &self.when_false] {
            if let Err(err) = stage.verify_requests(ctx) {
                merr.add(err);
            }
        }
        merr.into_result()
    }

    fn reset_request_verifications(&self, ctx: &mut dyn ContextStore) {
        self.when_true.reset_request_verifications(ctx);
        self.when_false.reset_request_verifications(ctx);
    }
}

impl ResponseVerifier for Filter {
    fn verify_responses(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError> {
        let mut merr = MultiError::new();
        for stage in [&self.when_true, &self.when_false] {
            if let Err(err) = stage.verify_responses(ctx) {
                merr.add(err);
            }
        }
        merr.into_result()
    }

    fn reset_response_verifications(&self, ctx: &mut dyn ContextStore) {
        self.when_true.reset_response_verifications(ctx);
        self.when_false.reset_response_verifications(ctx);
    }
}
