//! Rate limiter trait shared by the agent-backed engine and the no-op limiter.

use async_trait::async_trait;
use tracing::debug;

use super::types::{RatelimitRequest, RatelimitResponse, RequestContext};
use crate::error::RatelimitError;

/// A rate limit decision maker.
///
/// Route handlers hold an `Arc<dyn RateLimiter>` so the real engine and the
/// disabled [`NoopRateLimiter`] are interchangeable.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide a single request.
    async fn limit(
        &self,
        ctx: &RequestContext,
        req: &RatelimitRequest,
    ) -> Result<RatelimitResponse, RatelimitError>;

    /// Decide an ordered list of limits for one request.
    ///
    /// Limits are evaluated one after another; the first error or deny is
    /// returned and later limits are never consulted. When everything passes
    /// the first limit's response is returned. An empty list always passes.
    async fn multi_limit(
        &self,
        ctx: &RequestContext,
        reqs: &[RatelimitRequest],
    ) -> Result<RatelimitResponse, RatelimitError> {
        let mut first: Option<RatelimitResponse> = None;

        for req in reqs {
            let res = self.limit(ctx, req).await?;
            if !res.passed {
                debug!(
                    request_id = %ctx.request_id,
                    name = %req.name,
                    identifier = %req.identifier,
                    "Limit triggered, skipping remaining limits"
                );
                return Ok(res);
            }
            if first.is_none() {
                first = Some(res);
            }
        }

        Ok(first.unwrap_or_else(RatelimitResponse::unknown))
    }

    /// Wait for background work started by earlier calls.
    async fn flush(&self) {}
}

/// Limiter used when rate limiting is disabled; always passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn limit(
        &self,
        _ctx: &RequestContext,
        _req: &RatelimitRequest,
    ) -> Result<RatelimitResponse, RatelimitError> {
        Ok(RatelimitResponse::unknown())
    }
}
