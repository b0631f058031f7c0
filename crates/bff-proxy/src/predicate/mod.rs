//! Request/response predicates used by conditional filters.
//!
//! A [`Condition`] is evaluated once per phase. Matchers may bind values into
//! the request context as a side effect of a successful match (the URL matcher
//! binds path parameters), but never on a failed one.
//!
//! # Module Structure
//!
//! - `path_pattern` - Path templates with `:name` parameters
//! - `url` - URL matcher (scheme, host, path, query, fragment)
//! - `status` - Response status code matcher

mod path_pattern;
mod status;
mod url;

pub use path_pattern::{PathParams, PathPattern, PatternError};
pub use status::StatusMatcher;
pub use url::UrlMatcher;

use crate::context::ContextStore;
use crate::proxy::{ProxyRequest, ProxyResponse};

/// Predicate over the request and the response phase.
pub trait Condition: Send + Sync {
    fn match_request(&self, req: &ProxyRequest, ctx: &mut dyn ContextStore) -> bool;

    fn match_response(&self, res: &ProxyResponse, ctx: &mut dyn ContextStore) -> bool;
}
