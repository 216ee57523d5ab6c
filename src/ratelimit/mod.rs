//! Rate limit decisions: types, the counter cache and the decision engine.

mod cache;
mod edge;
mod engine;
mod limiter;
mod sampling;
mod types;
mod window;

pub use cache::{CacheEntry, CounterCache};
pub use edge::{EdgeError, EdgeLimiter, EdgeLimiters, EdgeOutcome};
pub use engine::{AgentRateLimiter, AgentRateLimiterBuilder};
pub use limiter::{NoopRateLimiter, RateLimiter};
pub use sampling::{FixedRandom, RandomSource, SeededRandom, ThreadRandom};
pub use types::{RatelimitRequest, RatelimitResponse, RequestContext, UNKNOWN};
pub use window::{Window, WindowKey};
