//! Auxiliary resource fetching.
//!
//! # Module Structure
//!
//! - `resource` - One upstream JSON resource and its [`BodyMerger`]
//! - `multi` - Concurrent fan-out over several resources

mod multi;
mod resource;

pub use multi::MultiFetcher;
pub use resource::{BodyMerger, InvalidBehavior, MergeBehavior, ResourceFetcher};

#[cfg(test)]
pub(crate) mod testing {
    //! In-process upstream used by fetcher tests.

    use crate::proxy::{FetchError, ProxyRequest, RequestInfo, UpstreamClient};
    use async_trait::async_trait;
    use bytes::Bytes;
    use hyper::{Response, StatusCode};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Route {
        status: StatusCode,
        body: &'static str,
        delay: Duration,
    }

    /// Answers by exact URL; unknown URLs get an empty 404.
    #[derive(Debug, Default)]
    pub(crate) struct StubUpstream {
        routes: HashMap<String, Route>,
        seen: Mutex<Vec<RequestInfo>>,
    }

    impl StubUpstream {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn route(self, url: &str, body: &'static str) -> Self {
            self.with_status(url, StatusCode::OK, body)
        }

        pub(crate) fn with_status(mut self, url: &str, status: StatusCode, body: &'static str) -> Self {
            self.routes.insert(
                url.to_string(),
                Route {
                    status,
                    body,
                    delay: Duration::ZERO,
                },
            );
            self
        }

        pub(crate) fn slow(mut self, url: &str, body: &'static str, delay: Duration) -> Self {
            self.routes.insert(
                url.to_string(),
                Route {
                    status: StatusCode::OK,
                    body,
                    delay,
                },
            );
            self
        }

        /// Requests received so far, in arrival order.
        pub(crate) fn seen(&self) -> Vec<RequestInfo> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl UpstreamClient for StubUpstream {
        async fn execute(&self, req: ProxyRequest) -> Result<Response<Bytes>, FetchError> {
            self.seen.lock().push(RequestInfo::from_request(&req));

            let route = self.routes.get(&req.uri().to_string()).cloned();
            let Some(route) = route else {
                let mut res = Response::new(Bytes::new());
                *res.status_mut() = StatusCode::NOT_FOUND;
                return Ok(res);
            };

            if !route.delay.is_zero() {
                tokio::time::sleep(route.delay).await;
            }

            let mut res = Response::new(Bytes::from_static(route.body.as_bytes()));
            *res.status_mut() = route.status;
            Ok(res)
        }
    }
}
