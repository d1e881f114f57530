use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(&'static str),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("persistence timed out after {0:?}")]
    Timeout(Duration),
}

impl ChatError {
    /// True for failures of the backing store, as opposed to bad input.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Timeout(_))
    }

    /// Reason string safe to hand back to a client. Store details stay in the logs.
    pub fn client_reason(&self) -> String {
        if self.is_persistence() {
            "storage unavailable".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(e: anyhow::Error) -> Self {
        Self::Persistence(format!("{e:#}"))
    }
}
