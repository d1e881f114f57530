use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    /// The live handshake was answered with `connect_error`.
    #[error("connection refused: {0}")]
    ConnectRefused(String),

    /// The server refused the join for a transient reason (its store was
    /// unavailable) although the caller takes part in the conversation.
    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("connection closed")]
    Closed,
}

impl ClientError {
    /// True when trying the same call again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::JoinFailed(_) | ClientError::Closed => true,
            ClientError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
