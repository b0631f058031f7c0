//! Structured request/response logging.

use super::{RequestModifier, ResponseModifier};
use crate::context::{logging_skipped, ContextStore};
use crate::error::ModifierError;
use crate::proxy::{ProxyRequest, ProxyResponse};
use async_trait::async_trait;
use hyper::header::{HeaderName, AUTHORIZATION, COOKIE, HOST, PROXY_AUTHORIZATION, SET_COOKIE};
use hyper::{HeaderMap, Uri};
use tracing::info;

/// Headers whose values never reach the log.
const REDACTED_HEADERS: [HeaderName; 4] =
    [AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE, SET_COOKIE];

const REDACTED: &str = "[REDACTED]";

/// Emits one `info` event per request and per response.
///
/// Credential headers are logged by name only. Cycles marked with
/// [`crate::context::skip_logging`] are not logged at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Self
    }
}

fn host_of(uri: &Uri, headers: &HeaderMap) -> String {
    if let Some(authority) = uri.authority() {
        return authority.to_string();
    }
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn format_headers(headers: &HeaderMap) -> String {
    let mut pairs: Vec<String> = headers
        .keys()
        .map(|name| {
            if REDACTED_HEADERS.contains(name) {
                return format!("{}: {}", name, REDACTED);
            }
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            format!("{}: {}", name, values.join(", "))
        })
        .collect();
    pairs.sort();
    pairs.join("; ")
}

#[async_trait]
impl RequestModifier for Logger {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        if logging_skipped(ctx) {
            return Ok(());
        }
        let uri = req.uri();
        info!(
            method = %req.method(),
            scheme = uri.scheme_str().unwrap_or_default(),
            host = %host_of(uri, req.headers()),
            path = uri.path(),
            headers = %format_headers(req.headers()),
            "Request to {}",
            uri
        );
        Ok(())
    }
}

#[async_trait]
impl ResponseModifier for Logger {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        if logging_skipped(ctx) {
            return Ok(());
        }
        let request = res.request();
        info!(
            method = %request.method,
            scheme = request.uri.scheme_str().unwrap_or_default(),
            host = %host_of(&request.uri, &request.headers),
            path = request.uri.path(),
            status = res.status().as_u16(),
            headers = %format_headers(res.headers()),
            "Response from {}",
            request.uri
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::proxy::RequestInfo;
    use bytes::Bytes;
    use hyper::{Request, Response};
    use tracing_test::traced_test;

    #[test]
    fn test_format_headers_sorted_and_joined() {
        let mut headers = HeaderMap::new();
        headers.insert("x-b", "2".parse().unwrap());
        headers.append("x-a", "1".parse().unwrap());
        headers.append("x-a", "3".parse().unwrap());

        assert_eq!(format_headers(&headers), "x-a: 1, 3; x-b: 2");
    }

    #[test]
    fn test_format_headers_redacts_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer s3cr3t".parse().unwrap());
        headers.insert(COOKIE, "session=abc".parse().unwrap());
        headers.insert("x-trace", "t-1".parse().unwrap());

        assert_eq!(
            format_headers(&headers),
            "authorization: [REDACTED]; cookie: [REDACTED]; x-trace: t-1"
        );
    }

    #[test]
    fn test_host_falls_back_to_header() {
        let uri: Uri = "/users".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(HOST, "api.example.com".parse().unwrap());
        assert_eq!(host_of(&uri, &headers), "api.example.com");

        let uri: Uri = "http://svc.local:8080/users".parse().unwrap();
        assert_eq!(host_of(&uri, &headers), "svc.local:8080");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logger_emits_request_and_response_events() {
        let logger = Logger::new();
        let mut ctx = RequestContext::new();
        let mut req = Request::builder()
            .uri("http://api.example.com/users/1")
            .body(Bytes::new())
            .unwrap();

        logger.modify_request(&mut req, &mut ctx).await.unwrap();

        let mut res = ProxyResponse::new(
            RequestInfo::from_request(&req),
            Response::new(Bytes::new()),
        );
        logger.modify_response(&mut res, &mut ctx).await.unwrap();

        assert!(logs_contain("Request to http://api.example.com/users/1"));
        assert!(logs_contain("Response from http://api.example.com/users/1"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logger_masks_credentials() {
        let logger = Logger::new();
        let mut ctx = RequestContext::new();
        let mut req = Request::builder()
            .uri("http://api.example.com/me")
            .header(AUTHORIZATION, "Bearer s3cr3t")
            .header(PROXY_AUTHORIZATION, "Basic cHJveHk6cHc=")
            .body(Bytes::new())
            .unwrap();

        logger.modify_request(&mut req, &mut ctx).await.unwrap();

        let upstream = Response::builder()
            .header(SET_COOKIE, "session=abc123")
            .body(Bytes::new())
            .unwrap();
        let mut res = ProxyResponse::new(RequestInfo::from_request(&req), upstream);
        logger.modify_response(&mut res, &mut ctx).await.unwrap();

        assert!(logs_contain("authorization: [REDACTED]"));
        assert!(logs_contain("set-cookie: [REDACTED]"));
        assert!(!logs_contain("s3cr3t"));
        assert!(!logs_contain("cHJveHk6cHc="));
        assert!(!logs_contain("abc123"));
    }
}
