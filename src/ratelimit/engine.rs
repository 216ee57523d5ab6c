//! Agent-backed rate limiter with a local counter cache.
//!
//! Every decision starts from the cache. Callers already known to be over
//! their limit are denied without touching the agent. Strict (sync) requests
//! then await the agent; async requests are answered optimistically from the
//! cache while a background task reconciles the cache with the agent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace, warn};

use super::cache::{CacheEntry, CounterCache};
use super::edge::EdgeLimiters;
use super::limiter::RateLimiter;
use super::sampling::{RandomSource, ThreadRandom};
use super::types::{RatelimitRequest, RatelimitResponse, RequestContext, UNKNOWN};
use super::window::{Window, WindowKey};
use crate::agent::{Agent, AuthorityClient};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::RatelimitError;
use crate::metrics::{DecisionMode, DecisionSource, Metric, MetricsSink, TracingMetrics};

/// The rate limit decision engine.
///
/// Cloning is cheap and clones share the cache and background tasks.
#[derive(Clone)]
pub struct AgentRateLimiter {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    authority: AuthorityClient,
    cache: CounterCache,
    edges: EdgeLimiters,
    metrics: Arc<dyn MetricsSink>,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    /// Chance of forcing a sync call for an async request with no cached data
    sync_on_no_data: f64,
    warmup: Duration,
    started_at: i64,
    background: TaskTracker,
}

impl std::fmt::Debug for AgentRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRateLimiter")
            .field("authority", &self.inner.authority)
            .field("cached_windows", &self.inner.cache.len())
            .field("edges", &self.inner.edges)
            .field("sync_on_no_data", &self.inner.sync_on_no_data)
            .field("warmup", &self.inner.warmup)
            .finish()
    }
}

impl AgentRateLimiter {
    pub fn builder(agent: Arc<dyn Agent>) -> AgentRateLimiterBuilder {
        AgentRateLimiterBuilder::new(agent)
    }

    /// The engine's counter cache.
    pub fn cache(&self) -> &CounterCache {
        &self.inner.cache
    }

    /// Number of background reconciliations still running.
    pub fn pending_reconciliations(&self) -> usize {
        self.inner.background.len()
    }

    async fn decide(
        &self,
        ctx: &RequestContext,
        req: &RatelimitRequest,
    ) -> (Result<RatelimitResponse, RatelimitError>, DecisionSource) {
        if req.is_async {
            if let Some(res) = self.check_edge(ctx, req).await {
                return (Ok(res), DecisionSource::Edge);
            }
        }

        let inner = &self.inner;
        let now = inner.clock.now_millis();
        let window = Window::at(now, req.interval);
        let key = WindowKey::new(&req.identifier, window, req.shard.as_deref());

        let cached = inner.cache.get(&key);
        let CacheEntry { current, .. } = cached.unwrap_or_default();
        trace!(key = %key, cached = current, hit = cached.is_some(), "Probed ratelimit cache");

        if current >= req.limit {
            debug!(
                request_id = %ctx.request_id,
                key = %key,
                current,
                limit = req.limit,
                "Cached counter already exhausted"
            );
            let res = RatelimitResponse::counted(req.limit, current, window.reset, false, &req.name);
            return (Ok(res), DecisionSource::Cache);
        }

        if self.must_sync(req, cached.is_some(), now) {
            let res = inner.reconcile(&ctx.request_id, req, &key).await;
            return (res, DecisionSource::Agent);
        }

        let optimistic = current.saturating_add(req.cost);
        let res = if optimistic <= req.limit {
            inner.cache.set_max(&key, optimistic, window.reset);
            RatelimitResponse::counted(req.limit, optimistic, window.reset, true, &req.name)
        } else {
            RatelimitResponse::counted(req.limit, current, window.reset, false, &req.name)
        };

        self.spawn_reconcile(ctx, req, key, current);

        (Ok(res), DecisionSource::Cache)
    }

    /// Whether this call has to await the agent.
    fn must_sync(&self, req: &RatelimitRequest, cache_hit: bool, now: i64) -> bool {
        if !req.is_async {
            return true;
        }
        if cache_hit {
            return false;
        }

        // A cold process has no data for anyone; sampling only starts once warm.
        let uptime = now - self.inner.started_at;
        let warmup = i64::try_from(self.inner.warmup.as_millis()).unwrap_or(i64::MAX);
        if uptime <= warmup {
            return false;
        }
        self.inner.random.next_f64() < self.inner.sync_on_no_data
    }

    async fn check_edge(
        &self,
        ctx: &RequestContext,
        req: &RatelimitRequest,
    ) -> Option<RatelimitResponse> {
        let edge = self.inner.edges.get(req.limit, req.interval)?;
        let key = EdgeLimiters::key(req.namespace_id.as_deref(), &req.identifier);

        match edge.check(&key).await {
            Ok(outcome) => Some(RatelimitResponse {
                current: UNKNOWN,
                remaining: UNKNOWN,
                reset: UNKNOWN,
                passed: outcome.success,
                triggered: (!outcome.success).then(|| req.name.clone()),
            }),
            Err(e) => {
                warn!(
                    request_id = %ctx.request_id,
                    identifier = %req.identifier,
                    error = %e,
                    "Edge ratelimit failed, falling back to cache"
                );
                None
            }
        }
    }

    /// Reconcile the cache with the agent after the caller got its answer.
    fn spawn_reconcile(
        &self,
        ctx: &RequestContext,
        req: &RatelimitRequest,
        key: WindowKey,
        cached_current: i64,
    ) {
        let inner = self.inner.clone();
        let request_id = ctx.request_id.clone();
        let req = req.clone();

        self.inner.background.spawn(async move {
            match inner.reconcile(&request_id, &req, &key).await {
                Ok(res) => inner.metrics.emit(Metric::Accuracy {
                    identifier: req.identifier.clone(),
                    namespace_id: req.namespace_id.clone(),
                    responded: cached_current.saturating_add(req.cost) <= req.limit,
                    correct: res.current.saturating_add(req.cost) <= req.limit,
                }),
                Err(e) => error!(
                    request_id = %request_id,
                    identifier = %req.identifier,
                    error = %e,
                    "Background ratelimit reconciliation failed"
                ),
            }
        });
    }
}

impl EngineInner {
    /// Ask the agent and fold its answer into the cache.
    async fn reconcile(
        &self,
        request_id: &str,
        req: &RatelimitRequest,
        key: &WindowKey,
    ) -> Result<RatelimitResponse, RatelimitError> {
        let res = self.authority.call(request_id, req).await?;
        self.cache.set_max(key, res.current, res.reset);
        Ok(res)
    }
}

#[async_trait]
impl RateLimiter for AgentRateLimiter {
    async fn limit(
        &self,
        ctx: &RequestContext,
        req: &RatelimitRequest,
    ) -> Result<RatelimitResponse, RatelimitError> {
        if let Err(e) = req.validate() {
            warn!(request_id = %ctx.request_id, identifier = %req.identifier, error = %e, "Rejecting ratelimit request");
            return Err(e);
        }

        let start = Instant::now();
        let (res, source) = self.decide(ctx, req).await;

        self.inner.metrics.emit(Metric::Decision {
            workspace_id: req.workspace_id.clone(),
            namespace_id: req.namespace_id.clone(),
            identifier: req.identifier.clone(),
            latency: start.elapsed(),
            mode: if req.is_async {
                DecisionMode::Async
            } else {
                DecisionMode::Sync
            },
            source,
            passed: res.as_ref().ok().map(|r| r.passed),
            error: res.is_err(),
        });

        res
    }

    async fn flush(&self) {
        let background = &self.inner.background;
        debug!(pending = background.len(), "Waiting for background reconciliations");
        background.close();
        background.wait().await;
        background.reopen();
    }
}

/// Builder for [`AgentRateLimiter`].
pub struct AgentRateLimiterBuilder {
    agent: Arc<dyn Agent>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    metrics: Arc<dyn MetricsSink>,
    edges: EdgeLimiters,
}

impl AgentRateLimiterBuilder {
    fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            metrics: Arc::new(TracingMetrics),
            edges: EdgeLimiters::new(),
        }
    }

    /// Take agent, cache and sampling settings from `config`.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn edges(mut self, edges: EdgeLimiters) -> Self {
        self.edges = edges;
        self
    }

    pub fn build(self) -> AgentRateLimiter {
        let cache = CounterCache::new(
            self.config.cache.capacity,
            self.clock.clone(),
            self.metrics.clone(),
        );
        let authority = AuthorityClient::from_config(self.agent, &self.config.agent);

        AgentRateLimiter {
            inner: Arc::new(EngineInner {
                authority,
                cache,
                edges: self.edges,
                metrics: self.metrics,
                random: self.random,
                started_at: self.clock.now_millis(),
                clock: self.clock,
                sync_on_no_data: self.config.sampling.probability(),
                warmup: self.config.sampling.warmup(),
                background: TaskTracker::new(),
            }),
        }
    }
}
