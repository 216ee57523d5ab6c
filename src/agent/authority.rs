//! Bounded retry burst around agent calls.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use super::{Agent, AgentError, AgentRequest, AgentResponse};
use crate::config::AgentConfig;
use crate::error::RatelimitError;
use crate::ratelimit::{RatelimitRequest, RatelimitResponse};

const DEFAULT_RETRIES: usize = 3;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);

/// Calls the agent up to `1 + retries` times back to back.
///
/// Each attempt is bounded by `attempt_timeout`; a timeout counts as a failed
/// attempt. There is no delay between attempts.
#[derive(Clone)]
pub struct AuthorityClient {
    agent: Arc<dyn Agent>,
    retries: usize,
    attempt_timeout: Duration,
}

impl std::fmt::Debug for AuthorityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityClient")
            .field("retries", &self.retries)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl AuthorityClient {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            retries: DEFAULT_RETRIES,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn from_config(agent: Arc<dyn Agent>, config: &AgentConfig) -> Self {
        Self::new(agent)
            .with_retries(config.retries)
            .with_attempt_timeout(config.attempt_timeout())
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Total attempts per call.
    pub fn attempts(&self) -> usize {
        self.retries + 1
    }

    /// Ask the agent for an authoritative decision.
    pub async fn call(
        &self,
        request_id: &str,
        req: &RatelimitRequest,
    ) -> Result<RatelimitResponse, RatelimitError> {
        let attempts = self.attempts();
        let mut last_error: Option<AgentError> = None;

        for attempt in 1..=attempts {
            let message = AgentRequest {
                identifier: req.identifier.clone(),
                limit: req.limit,
                duration: req.interval,
                cost: req.cost,
                name: req.name.clone(),
            };

            let result =
                match tokio::time::timeout(self.attempt_timeout, self.agent.ratelimit(request_id, message))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::Timeout(self.attempt_timeout)),
                };

            match result {
                Ok(response) => return Ok(translate(req, response)),
                Err(e) => {
                    warn!(
                        request_id,
                        identifier = %req.identifier,
                        attempt,
                        error = %e,
                        "Calling ratelimit agent failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        error!(
            request_id,
            identifier = %req.identifier,
            attempts,
            error = %message,
            "Ratelimit agent retries exhausted"
        );
        Err(RatelimitError::Unavailable { attempts, message })
    }
}

/// Map the agent's answer onto the caller-facing response.
fn translate(req: &RatelimitRequest, response: AgentResponse) -> RatelimitResponse {
    let remaining = response.remaining.max(0);
    let current = (req.limit - remaining).max(0);
    RatelimitResponse::counted(req.limit, current, response.reset, response.success, &req.name)
}
