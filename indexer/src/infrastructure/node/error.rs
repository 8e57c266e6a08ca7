use thiserror::Error;

/// Errors raised while talking to chain nodes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("Query timed out after {0}ms")]
    Timeout(u64),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unsupported by provider: {0}")]
    Unsupported(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("All node endpoints are unavailable")]
    AllEndpointsUnavailable,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NodeError {
    /// Whether retrying the same request, possibly on another connection, can succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NodeError::Timeout(_)
                | NodeError::Rpc(_)
                | NodeError::Http(_)
                | NodeError::NotFound(_)
                | NodeError::ConnectionLost(_)
        )
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            NodeError::Timeout(0)
        } else if error.is_decode() {
            NodeError::Decode(error.to_string())
        } else if error.is_connect() {
            NodeError::ConnectionLost(error.to_string())
        } else {
            NodeError::Http(error.to_string())
        }
    }
}
