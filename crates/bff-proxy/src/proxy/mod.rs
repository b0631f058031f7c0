//! Host-facing message types and upstream transport.
//!
//! # Module Structure
//!
//! - `message` - Buffered request/response types shared with the host runtime
//! - `headers` - Static header values and the JSON header helper
//! - `client` - Upstream HTTP client used by resource fetchers

mod client;
mod headers;
mod message;

pub use client::{FetchError, HttpUpstream, UpstreamClient, DEFAULT_FETCH_TIMEOUT};
pub use headers::{JsonHeadersExt, APPLICATION_JSON};
pub use message::{ProxyRequest, ProxyResponse, ReplaceBody, RequestInfo};
