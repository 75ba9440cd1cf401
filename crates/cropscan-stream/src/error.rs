//! Streaming error types.

use std::time::Duration;

use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    #[error("A detection session is already running")]
    AlreadyStreaming,

    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Timed out after {0:?} waiting for the stream to open")]
    ConnectTimeout(Duration),

    #[error("Could not open stream: {0}")]
    ConnectFailed(String),

    #[error("Session stopped before the stream opened")]
    Cancelled,

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Malformed detection message: {0}")]
    MalformedMessage(String),

    #[error("Invalid frame source: {0}")]
    InvalidSource(String),

    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    #[error("Session task is no longer running")]
    SessionClosed,
}

impl StreamError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }
}
