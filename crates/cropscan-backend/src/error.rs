//! Backend client error types.

use thiserror::Error;

use cropscan_models::EnvelopeError;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while talking to the backend or the token store.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether logging in again could fix this.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, BackendError::Unauthorized(_))
    }
}

impl From<EnvelopeError> for BackendError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Rejected(msg) => BackendError::Rejected(msg),
            EnvelopeError::MissingData => {
                BackendError::InvalidResponse("response carried no data".to_string())
            }
        }
    }
}
