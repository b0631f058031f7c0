//! Safe header insertion helpers.
//!
//! Compile-time header values for the JSON bodies this crate produces, so call
//! sites never parse header values at runtime.

use hyper::header::{HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use hyper::http::response::Parts;
use hyper::Response;

pub static APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Extension trait for responses whose body was replaced by JSON.
pub trait JsonHeadersExt {
    /// Set `Content-Type: application/json` and drop any `Content-Encoding`,
    /// since the new body is never encoded.
    fn mark_json(&mut self);
}

impl<B> JsonHeadersExt for Response<B> {
    fn mark_json(&mut self) {
        let headers = self.headers_mut();
        headers.insert(CONTENT_TYPE, APPLICATION_JSON.clone());
        headers.remove(CONTENT_ENCODING);
    }
}

impl JsonHeadersExt for Parts {
    fn mark_json(&mut self) {
        self.headers.insert(CONTENT_TYPE, APPLICATION_JSON.clone());
        self.headers.remove(CONTENT_ENCODING);
    }
}
