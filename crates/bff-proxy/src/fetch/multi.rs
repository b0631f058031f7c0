//! Concurrent fan-out over several resources.

use super::resource::ResourceFetcher;
use crate::context::{ContextStore, RequestContext};
use crate::error::{ModifierError, MultiError};
use crate::modifier::{ResponseModifier, Stage};
use crate::proxy::{FetchError, JsonHeadersExt, ProxyResponse, ReplaceBody};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs every fetcher concurrently and merges their bodies in declaration
/// order.
///
/// All fetches run to completion even when a sibling fails. If any failed,
/// every failure is returned and the response is left untouched.
#[derive(Debug, Clone, Default)]
pub struct MultiFetcher {
    fetchers: Vec<Arc<ResourceFetcher>>,
}

impl MultiFetcher {
    pub fn new(fetchers: Vec<ResourceFetcher>) -> Self {
        Self {
            fetchers: fetchers.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    pub fn into_stage(self) -> Stage {
        let fetcher = Arc::new(self);
        Stage::new().with_response(fetcher)
    }
}

#[async_trait]
impl ResponseModifier for MultiFetcher {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!(
            "body.MultiFetcher.ModifyResponse: request: {}",
            res.request().uri
        );

        let downstream = Arc::new(res.request().clone());
        let tasks: Vec<_> = self
            .fetchers
            .iter()
            .map(|fetcher| {
                let fetcher = Arc::clone(fetcher);
                let downstream = Arc::clone(&downstream);
                let mut scoped = RequestContext::snapshot(&*ctx);
                tokio::spawn(async move { fetcher.fetch(&downstream, &mut scoped).await })
            })
            .collect();

        // each slot is written by exactly one task; join order is declaration order
        let mut merr = MultiError::new();
        let mut mergers = Vec::with_capacity(tasks.len());
        for (index, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(merger)) => mergers.push(merger),
                Ok(Err(err)) => merr.add(err.into()),
                Err(join) => merr.add(
                    FetchError::Join {
                        index,
                        reason: join.to_string(),
                    }
                    .into(),
                ),
            }
        }

        if !merr.is_empty() {
            warn!(
                "body.MultiFetcher.ModifyResponse: {} of {} resources failed",
                merr.len(),
                self.fetchers.len()
            );
            return Err(merr.into());
        }
        if mergers.is_empty() {
            return Ok(());
        }

        let mut body = res.body().clone();
        for merger in &mergers {
            body = merger.merge_into(&body)?;
        }
        res.mark_json();
        res.replace_body(body);
        Ok(())
    }
}
