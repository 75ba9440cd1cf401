//! Streaming session configuration.

use std::time::Duration;

/// Default time between frame captures.
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(1500);

/// Default bound on the open handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Shortest period the capture timer runs at.
pub const MIN_CAPTURE_INTERVAL: Duration = Duration::from_millis(1);

/// Streaming session configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Interval between frame captures while streaming
    pub capture_interval: Duration,
    /// Maximum wait for the channel's open acknowledgment
    pub connect_timeout: Duration,
    /// Outbound frames the WebSocket writer may hold before sends are dropped
    pub outbound_buffer: usize,
    /// Inbound transport events buffered ahead of the session
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            outbound_buffer: 2,
            event_buffer: 64,
        }
    }
}

impl StreamConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            capture_interval: Duration::from_millis(
                std::env::var("STREAM_CAPTURE_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|ms: &u64| *ms > 0)
                    .unwrap_or(1500),
            ),
            connect_timeout: Duration::from_millis(
                std::env::var("STREAM_CONNECT_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
            outbound_buffer: std::env::var("STREAM_OUTBOUND_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(2),
            event_buffer: 64,
        }
    }

    /// Capture timer period, never below [`MIN_CAPTURE_INTERVAL`].
    pub fn capture_period(&self) -> Duration {
        self.capture_interval.max(MIN_CAPTURE_INTERVAL)
    }
}
