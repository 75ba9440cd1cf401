//! Session states, stop reasons and the observable snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cropscan_models::DetectionResult;

/// Session lifecycle: `Idle → Connecting → Streaming → Stopping → Idle`.
///
/// `Stopping` only exists inside a single teardown step; observers see the
/// session go straight from `Connecting`/`Streaming` back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session returned to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// `cancel()` was called or every handle was dropped
    Cancelled,
    /// The service sent a terminal "captured" result
    FinalResult,
    /// The consumer chose to act on an interim detection
    DetectionAccepted,
    /// No open acknowledgment within the connect timeout
    ConnectTimeout,
    /// The channel errored or closed during the handshake
    ConnectFailed(String),
    /// The channel errored while streaming
    TransportError(String),
    /// The remote side closed the channel while streaming
    RemoteClosed { code: Option<u16>, reason: String },
}

impl StopReason {
    /// Whether the stop was caused by a failure rather than a decision.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StopReason::ConnectTimeout
                | StopReason::ConnectFailed(_)
                | StopReason::TransportError(_)
                | StopReason::RemoteClosed { .. }
        )
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Requested => "requested",
            StopReason::Cancelled => "cancelled",
            StopReason::FinalResult => "final_result",
            StopReason::DetectionAccepted => "detection_accepted",
            StopReason::ConnectTimeout => "connect_timeout",
            StopReason::ConnectFailed(_) => "connect_failed",
            StopReason::TransportError(_) => "transport_error",
            StopReason::RemoteClosed { .. } => "remote_closed",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => write!(f, "stopped by user"),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::FinalResult => write!(f, "final detection received"),
            StopReason::DetectionAccepted => write!(f, "detection accepted"),
            StopReason::ConnectTimeout => write!(f, "could not connect to the AI service in time"),
            StopReason::ConnectFailed(e) => write!(f, "could not connect to the AI service: {}", e),
            StopReason::TransportError(e) => write!(f, "lost connection to the AI service: {}", e),
            StopReason::RemoteClosed { code, reason } => match code {
                Some(code) => write!(f, "AI service closed the stream ({}): {}", code, reason),
                None => write!(f, "AI service closed the stream: {}", reason),
            },
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Identifier of the current run; `None` while idle
    pub session_id: Option<Uuid>,
    /// Frames sent during the current (or last) run
    pub frame_counter: u64,
    pub last_frame_at: Option<DateTime<Utc>>,
    /// A transport channel is held
    pub channel_live: bool,
    /// The capture timer is running
    pub timer_active: bool,
    /// Latest interim result carrying a detection list
    pub last_result: Option<DetectionResult>,
}

impl SessionSnapshot {
    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }
}
