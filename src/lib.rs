//! Agentlimit - client-side rate limit decisions
//!
//! This crate decides, per request, whether a named quota has been exceeded.
//! The authoritative counters live in a remote agent; a local cache lets most
//! decisions skip the round trip while staying approximately correct.

pub mod agent;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ratelimit;

use std::sync::Arc;

use tracing::info;

use crate::agent::Agent;
use crate::config::EngineConfig;
use crate::ratelimit::{AgentRateLimiter, NoopRateLimiter, RateLimiter};

/// Build the limiter selected by `config.enabled`.
pub fn build_limiter(config: &EngineConfig, agent: Arc<dyn Agent>) -> Arc<dyn RateLimiter> {
    if !config.enabled {
        info!("Rate limiting disabled, all requests pass");
        return Arc::new(NoopRateLimiter);
    }

    info!(
        cache_capacity = config.cache.capacity,
        retries = config.agent.retries,
        sync_on_no_data = config.sampling.probability(),
        "Agent-backed rate limiter initialized"
    );
    Arc::new(AgentRateLimiter::builder(agent).config(config).build())
}
