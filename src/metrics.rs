//! Structured metric events emitted by the engine.
//!
//! The engine never talks to a metrics backend directly. It hands every event
//! to a [`MetricsSink`]; the default [`TracingMetrics`] sink turns them into
//! `tracing` events on the `metrics` target so any subscriber can forward them.

use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionSource {
    /// The edge-local limiter answered
    Edge,
    /// Answered from the local counter cache
    Cache,
    /// Answered by awaiting the agent
    Agent,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Edge => "edge",
            DecisionSource::Cache => "cache",
            DecisionSource::Agent => "agent",
        }
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the caller asked for strict or eventually consistent enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionMode {
    Sync,
    Async,
}

impl DecisionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionMode::Sync => "sync",
            DecisionMode::Async => "async",
        }
    }
}

impl fmt::Display for DecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metric observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    /// One `limit` call finished
    Decision {
        workspace_id: String,
        namespace_id: Option<String>,
        identifier: String,
        latency: Duration,
        mode: DecisionMode,
        source: DecisionSource,
        /// `None` when the call errored
        passed: Option<bool>,
        error: bool,
    },
    /// Counter cache size, sampled on every write
    CacheSize { size: usize },
    /// An optimistic async answer compared against the agent's later answer
    Accuracy {
        identifier: String,
        namespace_id: Option<String>,
        responded: bool,
        correct: bool,
    },
}

/// Receiver for metric events.
pub trait MetricsSink: Send + Sync + fmt::Debug {
    fn emit(&self, metric: Metric);
}

/// Sink that records every metric as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn emit(&self, metric: Metric) {
        match metric {
            Metric::Decision {
                workspace_id,
                namespace_id,
                identifier,
                latency,
                mode,
                source,
                passed,
                error,
            } => {
                debug!(
                    target: "metrics",
                    metric = "ratelimit.decision",
                    workspace_id = %workspace_id,
                    namespace_id = ?namespace_id,
                    identifier = %identifier,
                    latency_us = latency.as_micros() as u64,
                    mode = %mode,
                    source = %source,
                    passed = ?passed,
                    error = error,
                );
            }
            Metric::CacheSize { size } => {
                debug!(target: "metrics", metric = "ratelimit.cache.size", size = size);
            }
            Metric::Accuracy {
                identifier,
                namespace_id,
                responded,
                correct,
            } => {
                debug!(
                    target: "metrics",
                    metric = "ratelimit.accuracy",
                    identifier = %identifier,
                    namespace_id = ?namespace_id,
                    responded = responded,
                    correct = correct,
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Sink that keeps every event for later assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingMetrics {
        events: Mutex<Vec<Metric>>,
    }

    impl RecordingMetrics {
        pub(crate) fn events(&self) -> Vec<Metric> {
            self.events.lock().clone()
        }

        pub(crate) fn accuracy(&self) -> Vec<(bool, bool)> {
            self.events()
                .into_iter()
                .filter_map(|m| match m {
                    Metric::Accuracy {
                        responded, correct, ..
                    } => Some((responded, correct)),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn sources(&self) -> Vec<DecisionSource> {
            self.events()
                .into_iter()
                .filter_map(|m| match m {
                    Metric::Decision { source, .. } => Some(source),
                    _ => None,
                })
                .collect()
        }
    }

    impl MetricsSink for RecordingMetrics {
        fn emit(&self, metric: Metric) {
            self.events.lock().push(metric);
        }
    }
}
