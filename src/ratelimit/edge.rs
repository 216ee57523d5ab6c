//! Optional edge-local limiters used as a best-effort fast path.
//!
//! Edge limiters only know pass/deny, never exact counters. A binding is
//! looked up by the `(limit, interval)` pair of a request; a missing binding
//! simply means the fast path is unavailable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// An edge limiter call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("edge limiter failed: {0}")]
pub struct EdgeError(pub String);

/// Result of an edge limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeOutcome {
    pub success: bool,
}

#[async_trait]
pub trait EdgeLimiter: Send + Sync {
    async fn check(&self, key: &str) -> Result<EdgeOutcome, EdgeError>;
}

/// Edge limiters registered by binding name.
#[derive(Clone, Default)]
pub struct EdgeLimiters {
    bindings: HashMap<String, Arc<dyn EdgeLimiter>>,
}

impl std::fmt::Debug for EdgeLimiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeLimiters")
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EdgeLimiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding name for "`limit` requests per `interval`".
    ///
    /// Only whole-second intervals have a binding.
    pub fn binding_name(limit: i64, interval: i64) -> Option<String> {
        if interval <= 0 || interval % 1000 != 0 {
            return None;
        }
        Some(format!("RL_{}_{}s", limit, interval / 1000))
    }

    /// Register a limiter under an explicit binding name.
    pub fn insert(&mut self, name: impl Into<String>, limiter: Arc<dyn EdgeLimiter>) {
        self.bindings.insert(name.into(), limiter);
    }

    /// Register a limiter for a `(limit, interval)` pair.
    pub fn with_limit(mut self, limit: i64, interval: i64, limiter: Arc<dyn EdgeLimiter>) -> Self {
        if let Some(name) = Self::binding_name(limit, interval) {
            self.insert(name, limiter);
        }
        self
    }

    pub fn get(&self, limit: i64, interval: i64) -> Option<Arc<dyn EdgeLimiter>> {
        let name = Self::binding_name(limit, interval)?;
        self.bindings.get(&name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The key an edge limiter counts on.
    pub fn key(namespace_id: Option<&str>, identifier: &str) -> String {
        match namespace_id {
            Some(namespace) => format!("{}:{}", namespace, identifier),
            None => identifier.to_string(),
        }
    }
}
