//! Response status matcher.

use super::Condition;
use crate::context::ContextStore;
use crate::proxy::{ProxyRequest, ProxyResponse};
use hyper::StatusCode;

/// Matches responses with an exact status code.
///
/// The status of a request is unknown, so the request side never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMatcher {
    status: StatusCode,
}

impl StatusMatcher {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl Condition for StatusMatcher {
    fn match_request(&self, _req: &ProxyRequest, _ctx: &mut dyn ContextStore) -> bool {
        false
    }

    fn match_response(&self, res: &ProxyResponse, _ctx: &mut dyn ContextStore) -> bool {
        res.status() == self.status
    }
}
