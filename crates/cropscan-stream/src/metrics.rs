//! Metrics for detection streaming.
//!
//! Recorded through the `metrics` facade; without an installed recorder these
//! are no-ops.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const SESSIONS_STARTED_TOTAL: &str = "cropscan_stream_sessions_started_total";
    pub const SESSIONS_ACTIVE: &str = "cropscan_stream_sessions_active";
    pub const SESSIONS_ENDED_TOTAL: &str = "cropscan_stream_sessions_ended_total";
    pub const CONNECT_FAILURES_TOTAL: &str = "cropscan_stream_connect_failures_total";
    pub const FRAMES_SENT_TOTAL: &str = "cropscan_stream_frames_sent_total";
    pub const FRAME_BYTES: &str = "cropscan_stream_frame_bytes";
    pub const FRAMES_DROPPED_TOTAL: &str = "cropscan_stream_frames_dropped_total";
    pub const CAPTURE_FAILURES_TOTAL: &str = "cropscan_stream_capture_failures_total";
    pub const MESSAGES_RECEIVED_TOTAL: &str = "cropscan_stream_messages_received_total";
    pub const MALFORMED_MESSAGES_TOTAL: &str = "cropscan_stream_malformed_messages_total";
}

pub fn record_session_started() {
    counter!(names::SESSIONS_STARTED_TOTAL).increment(1);
    gauge!(names::SESSIONS_ACTIVE).increment(1.0);
}

pub fn record_session_ended(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::SESSIONS_ENDED_TOTAL, &labels).increment(1);
    gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
}

pub fn record_connect_failure(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::CONNECT_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_frame_sent(payload_len: usize) {
    counter!(names::FRAMES_SENT_TOTAL).increment(1);
    histogram!(names::FRAME_BYTES).record(payload_len as f64);
}

pub fn record_frame_dropped(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::FRAMES_DROPPED_TOTAL, &labels).increment(1);
}

pub fn record_capture_failure() {
    counter!(names::CAPTURE_FAILURES_TOTAL).increment(1);
}

pub fn record_message_received() {
    counter!(names::MESSAGES_RECEIVED_TOTAL).increment(1);
}

pub fn record_malformed_message() {
    counter!(names::MALFORMED_MESSAGES_TOTAL).increment(1);
}
