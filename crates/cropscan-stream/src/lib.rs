//! Real-time detection streaming sessions.
//!
//! This crate provides:
//! - A session controller that connects to the inference service over a
//!   WebSocket, captures frames on a fixed interval and dispatches detection
//!   results to a consumer
//! - A transport abstraction with a `tokio-tungstenite` implementation
//! - Frame sources (static image, single file, image directory)
//! - Data-URL frame encoding
//!
//! Streaming is best-effort: frames that cannot be sent right away are
//! dropped, never queued or retried.

pub mod config;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod health;
pub mod metrics;
pub mod session;
pub mod transport;

pub use config::StreamConfig;
pub use error::{StreamError, StreamResult};
pub use frame::{open_source, DirectorySource, FileSource, Frame, FrameSource, StaticSource};
pub use health::HealthProbe;
pub use session::{
    channel_consumer, ChannelConsumer, Decision, DecisionPolicy, DetectionConsumer, SessionDeps,
    SessionEvent, SessionHandle, SessionSnapshot, SessionState, StopReason,
};
pub use transport::{
    DropReason, OpenedChannel, ReadyState, SendOutcome, TransportChannel, TransportConnector,
    TransportEvent, WsConnector,
};
