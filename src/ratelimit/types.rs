//! Request and response types shared by every limiter implementation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RatelimitError;

/// Placeholder for counters the answering limiter does not know.
pub const UNKNOWN: i64 = -1;

/// One rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatelimitRequest {
    /// Which of the workspace's limits this is, e.g. "burst"
    pub name: String,
    pub workspace_id: String,
    #[serde(default)]
    pub namespace_id: Option<String>,
    /// The entity being limited
    pub identifier: String,
    /// Maximum cost permitted within one window
    pub limit: i64,
    /// Window length in milliseconds
    pub interval: i64,
    #[serde(default = "default_cost")]
    pub cost: i64,
    #[serde(default)]
    pub shard: Option<String>,
    /// Eventually consistent enforcement is acceptable
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

fn default_cost() -> i64 {
    1
}

impl RatelimitRequest {
    /// Create a synchronous request with a cost of 1.
    pub fn new(
        workspace_id: impl Into<String>,
        name: impl Into<String>,
        identifier: impl Into<String>,
        limit: i64,
        interval: i64,
    ) -> Self {
        Self {
            name: name.into(),
            workspace_id: workspace_id.into(),
            namespace_id: None,
            identifier: identifier.into(),
            limit,
            interval,
            cost: default_cost(),
            shard: None,
            is_async: false,
        }
    }

    pub fn with_cost(mut self, cost: i64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_namespace(mut self, namespace_id: impl Into<String>) -> Self {
        self.namespace_id = Some(namespace_id.into());
        self
    }

    pub fn with_shard(mut self, shard: impl Into<String>) -> Self {
        self.shard = Some(shard.into());
        self
    }

    pub fn asynchronous(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// Reject requests whose window math is undefined.
    pub fn validate(&self) -> Result<(), RatelimitError> {
        if self.interval <= 0 {
            return Err(RatelimitError::InvalidRequest(format!(
                "interval must be positive, got {}",
                self.interval
            )));
        }
        if self.limit < 0 {
            return Err(RatelimitError::InvalidRequest(format!(
                "limit must not be negative, got {}",
                self.limit
            )));
        }
        if self.cost < 0 {
            return Err(RatelimitError::InvalidRequest(format!(
                "cost must not be negative, got {}",
                self.cost
            )));
        }
        Ok(())
    }
}

/// The outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatelimitResponse {
    /// Best known consumption in the active window
    pub current: i64,
    pub remaining: i64,
    /// Epoch milliseconds when the next window begins
    pub reset: i64,
    pub passed: bool,
    /// Name of the limit that denied the request
    pub triggered: Option<String>,
}

impl RatelimitResponse {
    /// A pass carrying no counter information.
    pub fn unknown() -> Self {
        Self {
            current: UNKNOWN,
            remaining: UNKNOWN,
            reset: UNKNOWN,
            passed: true,
            triggered: None,
        }
    }

    /// A decision with known counters; `remaining` is derived from `current`.
    pub fn counted(limit: i64, current: i64, reset: i64, passed: bool, name: &str) -> Self {
        Self {
            current,
            remaining: (limit - current).max(0),
            reset,
            passed,
            triggered: (!passed).then(|| name.to_string()),
        }
    }
}

/// Request-scoped context passed alongside every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    /// A context with a freshly minted request id.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req = RatelimitRequest::new("ws_1", "burst", "key_1", 10, 1000);
        assert_eq!(req.cost, 1);
        assert!(!req.is_async);
        assert!(req.shard.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        let req = RatelimitRequest::new("ws_1", "burst", "key_1", 10, 0);
        assert!(matches!(req.validate(), Err(RatelimitError::InvalidRequest(_))));

        let req = RatelimitRequest::new("ws_1", "burst", "key_1", -1, 1000);
        assert!(req.validate().is_err());

        let req = RatelimitRequest::new("ws_1", "burst", "key_1", 10, 1000).with_cost(-2);
        assert!(req.validate().is_err());

        let req = RatelimitRequest::new("ws_1", "burst", "key_1", 0, 1000).with_cost(0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{
            "name": "sustained",
            "workspaceId": "ws_1",
            "identifier": "10.0.0.1",
            "limit": 100,
            "interval": 60000,
            "async": true
        }"#;
        let req: RatelimitRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.cost, 1);
        assert!(req.is_async);
        assert_eq!(req.namespace_id, None);
    }

    #[test]
    fn test_counted_response_clamps_remaining() {
        let res = RatelimitResponse::counted(10, 12, 5_000, false, "burst");
        assert_eq!(res.remaining, 0);
        assert_eq!(res.triggered.as_deref(), Some("burst"));

        let res = RatelimitResponse::counted(10, 4, 5_000, true, "burst");
        assert_eq!(res.remaining, 6);
        assert_eq!(res.triggered, None);
    }

    #[test]
    fn test_unknown_response_passes() {
        let res = RatelimitResponse::unknown();
        assert!(res.passed);
        assert_eq!(res.current, UNKNOWN);
        assert_eq!(res.remaining, UNKNOWN);
        assert_eq!(res.reset, UNKNOWN);
        assert_eq!(res.triggered, None);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestContext::new().request_id, RequestContext::new().request_id);
    }
}
