//! Error types for the rate limit engine.

use thiserror::Error;

/// The engine could not produce an authoritative answer.
///
/// Callers should not retry on this error: the engine has already exhausted
/// its own retry burst against the agent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatelimitError {
    /// Every attempt to reach the agent failed
    #[error("ratelimit agent unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: usize, message: String },

    /// The request cannot be evaluated (e.g. a zero-length window)
    #[error("invalid ratelimit request: {0}")]
    InvalidRequest(String),
}

/// Errors raised while setting the engine up.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Agent endpoint errors
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Rate limiting errors
    #[error("Rate limit error: {0}")]
    Ratelimit(#[from] RatelimitError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for setup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_names_attempts() {
        let err = RatelimitError::Unavailable {
            attempts: 4,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ratelimit agent unavailable after 4 attempts: connection refused"
        );
    }

    #[test]
    fn test_ratelimit_error_converts() {
        let err: Error = RatelimitError::InvalidRequest("interval must be positive".into()).into();
        assert!(matches!(err, Error::Ratelimit(RatelimitError::InvalidRequest(_))));
    }
}
