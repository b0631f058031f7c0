//! Buffered request/response types exchanged with the host runtime.

use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_LENGTH};
use hyper::{HeaderMap, Method, Request, Response, Uri};
use std::ops::{Deref, DerefMut};

/// A request with a fully buffered body.
pub type ProxyRequest = Request<Bytes>;

/// Extracted request metadata
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        }
    }
}

/// A buffered response together with the request that produced it.
///
/// Derefs to the inner `Response<Bytes>` so status, headers and body are
/// reached the usual way.
#[derive(Debug)]
pub struct ProxyResponse {
    request: RequestInfo,
    inner: Response<Bytes>,
}

impl ProxyResponse {
    pub fn new(request: RequestInfo, inner: Response<Bytes>) -> Self {
        Self { request, inner }
    }

    /// The request this response answers.
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn into_inner(self) -> Response<Bytes> {
        self.inner
    }
}

impl Deref for ProxyResponse {
    type Target = Response<Bytes>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ProxyResponse {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Swap a buffered body, keeping `Content-Length` in sync.
pub trait ReplaceBody {
    fn replace_body(&mut self, body: Bytes);
}

impl ReplaceBody for Request<Bytes> {
    fn replace_body(&mut self, body: Bytes) {
        self.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        *self.body_mut() = body;
    }
}

impl ReplaceBody for Response<Bytes> {
    fn replace_body(&mut self, body: Bytes) {
        self.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        *self.body_mut() = body;
    }
}
