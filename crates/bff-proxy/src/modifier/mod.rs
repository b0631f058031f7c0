//! Modifier and verifier contracts shared with the host runtime.
//!
//! A configured modifier may be a request modifier, a response modifier, a
//! request/response verifier, or any combination. The combination is decided
//! when the configuration is built and recorded in a [`Stage`], so callers
//! never have to query a modifier for optional capabilities at runtime.
//!
//! # Module Structure
//!
//! - `group` - Ordered group of stages (FIFO for both phases)
//! - `healthcheck` - Answers liveness checks without an upstream call
//! - `logger` - Structured request/response logging modifier

mod group;
mod healthcheck;
mod logger;

pub use group::Group;
pub use healthcheck::Healthcheck;
pub use logger::Logger;

use crate::context::ContextStore;
use crate::error::ModifierError;
use crate::proxy::{ProxyRequest, ProxyResponse};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Mutates a request before it is sent upstream.
#[async_trait]
pub trait RequestModifier: Send + Sync {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError>;
}

/// Mutates a response before it is returned downstream.
#[async_trait]
pub trait ResponseModifier: Send + Sync {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError>;
}

/// Reports request-side policy violations recorded in `ctx` since the last
/// reset.
///
/// Failures live in the context of the cycle that produced them, never on the
/// verifier, so one verifier can serve concurrent requests.
pub trait RequestVerifier: Send + Sync {
    fn verify_requests(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError>;

    fn reset_request_verifications(&self, ctx: &mut dyn ContextStore);
}

/// Reports response-side policy violations recorded in `ctx` since the last
/// reset.
pub trait ResponseVerifier: Send + Sync {
    fn verify_responses(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError>;

    fn reset_response_verifications(&self, ctx: &mut dyn ContextStore);
}

/// The capabilities of one configured modifier.
///
/// Absent slots are successful no-ops.
#[derive(Clone, Default)]
pub struct Stage {
    pub request: Option<Arc<dyn RequestModifier>>,
    pub response: Option<Arc<dyn ResponseModifier>>,
    pub request_verifier: Option<Arc<dyn RequestVerifier>>,
    pub response_verifier: Option<Arc<dyn ResponseVerifier>>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, modifier: Arc<dyn RequestModifier>) -> Self {
        self.request = Some(modifier);
        self
    }

    pub fn with_response(mut self, modifier: Arc<dyn ResponseModifier>) -> Self {
        self.response = Some(modifier);
        self
    }

    pub fn with_request_verifier(mut self, verifier: Arc<dyn RequestVerifier>) -> Self {
        self.request_verifier = Some(verifier);
        self
    }

    pub fn with_response_verifier(mut self, verifier: Arc<dyn ResponseVerifier>) -> Self {
        self.response_verifier = Some(verifier);
        self
    }

    /// Keep only the phases selected by a configuration scope.
    pub fn scoped(mut self, request: bool, response: bool) -> Self {
        if !request {
            self.request = None;
            self.request_verifier = None;
        }
        if !response {
            self.response = None;
            self.response_verifier = None;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_none()
            && self.response.is_none()
            && self.request_verifier.is_none()
            && self.response_verifier.is_none()
    }

    pub async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        match &self.request {
            Some(modifier) => modifier.modify_request(req, ctx).await,
            None => Ok(()),
        }
    }

    pub async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        match &self.response {
            Some(modifier) => modifier.modify_response(res, ctx).await,
            None => Ok(()),
        }
    }

    pub fn verify_requests(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError> {
        match &self.request_verifier {
            Some(verifier) => verifier.verify_requests(ctx),
            None => Ok(()),
        }
    }

    pub fn verify_responses(&self, ctx: &dyn ContextStore) -> Result<(), ModifierError> {
        match &self.response_verifier {
            Some(verifier) => verifier.verify_responses(ctx),
            None => Ok(()),
        }
    }

    pub fn reset_request_verifications(&self, ctx: &mut dyn ContextStore) {
        if let Some(verifier) = &self.request_verifier {
            verifier.reset_request_verifications(ctx);
        }
    }

    pub fn reset_response_verifications(&self, ctx: &mut dyn ContextStore) {
        if let Some(verifier) = &self.response_verifier {
            verifier.reset_response_verifications(ctx);
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("request", &self.request.is_some())
            .field("response", &self.response.is_some())
            .field("request_verifier", &self.request_verifier.is_some())
            .field("response_verifier", &self.response_verifier.is_some())
            .finish()
    }
}
