//! Uniform backend response envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `{ success, data?, message?, error? }` wrapper returned by every backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Item count on list endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<u32>,
}

/// Reasons an envelope could not be unwrapped into its payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("response carried no data")]
    MissingData,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
            results: None,
        }
    }

    /// Human-readable failure text, preferring `error` over `message`.
    pub fn failure_text(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }

    /// Unwrap the payload, treating `success == false` as a rejection.
    pub fn into_data(self) -> Result<T, EnvelopeError> {
        if !self.success {
            return Err(EnvelopeError::Rejected(self.failure_text()));
        }
        self.data.ok_or(EnvelopeError::MissingData)
    }

    /// Like [`into_data`](Self::into_data) but allows a successful response without data.
    pub fn into_optional(self) -> Result<Option<T>, EnvelopeError> {
        if !self.success {
            return Err(EnvelopeError::Rejected(self.failure_text()));
        }
        Ok(self.data)
    }
}
