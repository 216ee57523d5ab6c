//! Client side of the remote counting agent.
//!
//! The [`Agent`] trait is the raw RPC; [`GrpcAgent`] speaks it over tonic.
//! [`AuthorityClient`] wraps any agent with the bounded retry burst the
//! engine relies on.

mod authority;
mod grpc;
pub mod proto;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use authority::AuthorityClient;
pub use grpc::GrpcAgent;
pub use proto::{AgentRequest, AgentResponse};

/// A single agent call failed.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent returned status: {0}")]
    Status(#[from] tonic::Status),

    #[error("agent transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("agent call timed out after {0:?}")]
    Timeout(Duration),
}

/// The authoritative counting service.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn ratelimit(
        &self,
        request_id: &str,
        request: AgentRequest,
    ) -> Result<AgentResponse, AgentError>;
}
