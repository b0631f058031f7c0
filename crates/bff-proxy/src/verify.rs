//! Response status verification.

use crate::context::{ContextStore, VerifierId};
use crate::error::{ModifierError, MultiError};
use crate::modifier::{ResponseModifier, ResponseVerifier, Stage};
use crate::proxy::ProxyResponse;
use async_trait::async_trait;
use hyper::StatusCode;
use std::sync::Arc;
use tracing::debug;

/// Records every response whose status differs from the expected one.
///
/// Failures are recorded in the cycle's context and accumulate there until
/// [`ResponseVerifier::reset_response_verifications`].
#[derive(Debug)]
pub struct StatusVerifier {
    id: VerifierId,
    status: StatusCode,
}

impl StatusVerifier {
    pub fn new(status: StatusCode) -> Self {
        Self {
            id: VerifierId::next(),
            status,
        }
    }

    pub fn into_stage(self) -> Stage {
        let verifier = Arc::new(self);
        Stage::new()
            .with_response(verifier.clone())
            .with_response_verifier(verifier)
    }
}

#[async_trait]
impl ResponseModifier for StatusVerifier {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        if res.status() != self.status {
            let failure = format!(
                "response({}) status code verify failure: got {}, want {}",
                res.request().uri,
                res.status().as_u16(),
                self.status.as_u16()
            );
            debug!("status.Verifier: {}", failure);
            ctx.record_failure(self.id, failure);
        }
        Ok(())
    }
}

impl ResponseVerifier for StatusVerifier {
    fn verify_responses(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError> {
        let mut merr = MultiError::new();
        for failure in ctx.failures(self.id) {
            merr.add(ModifierError::Verification(failure));
        }
        merr.into_result()
    }

    fn reset_response_verifications(&self, ctx: &mut dyn ContextStore) {
        ctx.clear_failures(self.id);
    }
}
