//! Ordered group of modifiers.

use super::{RequestModifier, RequestVerifier, ResponseModifier, ResponseVerifier, Stage};
use crate::context::ContextStore;
use crate::error::{ModifierError, MultiError};
use crate::proxy::{ProxyRequest, ProxyResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Runs its stages in declaration order for both phases.
///
/// Without `aggregate_errors` the first failing stage ends the phase. With it,
/// every stage runs and all failures are returned as one aggregate.
#[derive(Debug, Default)]
pub struct Group {
    stages: Vec<Stage>,
    aggregate_errors: bool,
}

impl Group {
    pub fn new(aggregate_errors: bool) -> Self {
        Self {
            stages: Vec::new(),
            aggregate_errors,
        }
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn into_stage(self) -> Stage {
        let group = Arc::new(self);
        Stage::new()
            .with_request(group.clone())
            .with_response(group.clone())
            .with_request_verifier(group.clone())
            .with_response_verifier(group)
    }
}

#[async_trait]
impl RequestModifier for Group {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!("fifo.Group.ModifyRequest: {}", req.uri());

        let mut merr = MultiError::new();
        for stage in &self.stages {
            if let Err(err) = stage.modify_request(req, ctx).await {
                if !self.aggregate_errors {
                    return Err(err);
                }
                merr.add(err);
            }
        }
        merr.into_result()
    }
}

#[async_trait]
impl ResponseModifier for Group {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!("fifo.Group.ModifyResponse: {}", res.request().uri);

        let mut merr = MultiError::new();
        for stage in &self.stages {
            if let Err(err) = stage.modify_response(res, ctx).await {
                if !self.aggregate_errors {
                    return Err(err);
                }
                merr.add(err);
            }
        }
        merr.into_result()
    }
}

impl RequestVerifier for Group {
    fn verify_requests(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError> {
        let mut merr = MultiError::new();
        for stage in &self.stages {
            if let Err(err) = stage.verify_requests(ctx) {
                merr.add(err);
            }
        }
        merr.into_result()
    }

    fn reset_request_verifications(&self, ctx: &mut dyn ContextStore) {
        for stage in &self.stages {
            stage.reset_request_verifications(ctx);
        }
    }
}

impl ResponseVerifier for Group {
    fn verify_responses(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError> {
        let mut merr = MultiError::new();
        for stage in &self.stages {
            if let Err(err) = stage.verify_responses(ctx) {
                merr.add(err);
            }
        }
        merr.into_result()
    }

    fn reset_response_verifications(&self, ctx: &mut dyn ContextStore) {
        for stage in &self.stages {
            stage.reset_response_verifications(ctx);
        }
    }
}
