//! gRPC transport to the agent.

use async_trait::async_trait;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Channel, Endpoint};
use tracing::{info, trace};

use super::proto::{AgentRequest, AgentResponse, RATELIMIT_PATH};
use super::{Agent, AgentError};
use crate::config::AgentConfig;
use crate::error::{Error, Result};

/// Agent reached over a lazily connected tonic channel.
#[derive(Clone)]
pub struct GrpcAgent {
    inner: tonic::client::Grpc<Channel>,
    authorization: Option<AsciiMetadataValue>,
}

impl std::fmt::Debug for GrpcAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcAgent")
            .field("authorized", &self.authorization.is_some())
            .finish()
    }
}

impl GrpcAgent {
    /// Build a client without dialing; the first call establishes the connection.
    pub fn connect_lazy(config: &AgentConfig) -> Result<Self> {
        let channel = Endpoint::from_shared(config.url.clone())?
            .connect_timeout(config.connect_timeout())
            .timeout(config.attempt_timeout())
            .connect_lazy();

        let authorization = config
            .token
            .as_ref()
            .map(|token| {
                format!("Bearer {}", token)
                    .parse::<AsciiMetadataValue>()
                    .map_err(|e| Error::Config(format!("invalid agent token: {}", e)))
            })
            .transpose()?;

        info!(
            url = %config.url,
            authorized = authorization.is_some(),
            "Agent channel configured"
        );

        Ok(Self {
            inner: tonic::client::Grpc::new(channel),
            authorization,
        })
    }
}

#[async_trait]
impl Agent for GrpcAgent {
    async fn ratelimit(
        &self,
        request_id: &str,
        request: AgentRequest,
    ) -> std::result::Result<AgentResponse, AgentError> {
        trace!(
            request_id,
            identifier = %request.identifier,
            limit = request.limit,
            duration = request.duration,
            cost = request.cost,
            "Calling agent"
        );

        let mut grpc = self.inner.clone();
        grpc.ready().await.map_err(AgentError::Transport)?;

        let mut req = tonic::Request::new(request);
        if let Some(authorization) = &self.authorization {
            req.metadata_mut()
                .insert("authorization", authorization.clone());
        }
        if let Ok(id) = AsciiMetadataValue::try_from(request_id) {
            req.metadata_mut().insert("x-request-id", id);
        }

        let path = PathAndQuery::from_static(RATELIMIT_PATH);
        let response = grpc
            .unary(req, path, ProstCodec::<AgentRequest, AgentResponse>::default())
            .await?;

        Ok(response.into_inner())
    }
}
