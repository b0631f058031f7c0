//! Upstream HTTP client used by resource fetchers.
//!
//! Fetchers talk to the network only through [`UpstreamClient`], so the
//! transport can be swapped (tests use an in-process stub). The production
//! implementation wraps one shared `reqwest::Client` with a per-call timeout.

use super::message::ProxyRequest;
use crate::error::ModifierError;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::Response;
use std::time::Duration;
use tracing::{debug, info};

/// Per-call bound applied to every upstream fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while fetching an auxiliary resource.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid resource request {url}: {source}")]
    InvalidRequest {
        url: String,
        #[source]
        source: hyper::http::Error,
    },

    #[error("upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("failed to build upstream HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("resource {url}: {source}")]
    Modifier {
        url: String,
        #[source]
        source: Box<ModifierError>,
    },

    #[error("fetch task for resource #{index} did not complete: {reason}")]
    Join { index: usize, reason: String },
}

/// Executes one buffered upstream request.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn execute(&self, req: ProxyRequest) -> Result<Response<Bytes>, FetchError>;
}

/// `reqwest`-backed upstream client shared by every fetcher of a pipeline.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    /// Create a client whose calls are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        info!(
            "Upstream HTTP client configured: timeout={}s",
            timeout.as_secs()
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn execute(&self, req: ProxyRequest) -> Result<Response<Bytes>, FetchError> {
        let url = req.uri().to_string();
        let (parts, body) = req.into_parts();

        debug!("Fetching upstream resource: {} {}", parts.method, url);

        let upstream = self
            .client
            .request(parts.method, url.as_str())
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .map_err(|source| FetchError::Upstream {
                url: url.clone(),
                source,
            })?;

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|source| FetchError::Upstream { url, source })?;

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
