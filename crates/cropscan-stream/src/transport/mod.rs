//! Transport channel abstraction.
//!
//! A transport channel is one full-duplex message connection to the inference
//! endpoint. Opening returns the channel handle immediately together with a
//! receiver of asynchronous events (open, message, error, close); the
//! session owns both exclusively.

use tokio::sync::mpsc;

use crate::error::StreamResult;

pub mod websocket;

pub use websocket::WsConnector;

/// Readiness of a channel, mirroring the WebSocket ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        }
    }
}

/// Asynchronous channel event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Open,
    /// Inbound text frame
    Message(String),
    /// Socket error
    Error(String),
    /// Connection closed
    Closed { code: Option<u16>, reason: String },
}

impl TransportEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Open => "open",
            TransportEvent::Message(_) => "message",
            TransportEvent::Error(_) => "error",
            TransportEvent::Closed { .. } => "closed",
        }
    }
}

/// Why a send did not go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Channel was not in the open state
    NotOpen(ReadyState),
    /// Outbound buffer full
    Backpressure,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NotOpen(_) => "not_open",
            DropReason::Backpressure => "backpressure",
        }
    }
}

/// Result of a send attempt. Dropping is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped(DropReason),
}

/// Handle to one live channel.
pub trait TransportChannel: Send {
    fn ready_state(&self) -> ReadyState;

    /// Queue a text payload. Never blocks and never fails; payloads that
    /// cannot go out right now are dropped.
    fn send(&mut self, payload: String) -> SendOutcome;

    /// Close the channel. Safe to call any number of times.
    fn close(&mut self);
}

/// A freshly opened channel and its event stream.
pub struct OpenedChannel {
    pub channel: Box<dyn TransportChannel>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens channels to a URL.
pub trait TransportConnector: Send + Sync {
    fn open(&self, url: &str) -> StreamResult<OpenedChannel>;
}
