//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each opened channel runs one background task that performs the handshake
//! and then pumps frames in both directions. Outbound frames go through a
//! small bounded buffer; when it is full, sends are dropped rather than
//! queued.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::transport::{
    DropReason, OpenedChannel, ReadyState, SendOutcome, TransportChannel, TransportConnector,
    TransportEvent,
};

/// Close code reported when the connection ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

const CONNECTING: u8 = ReadyState::Connecting as u8;
const OPEN: u8 = ReadyState::Open as u8;
const CLOSING: u8 = ReadyState::Closing as u8;
const CLOSED: u8 = ReadyState::Closed as u8;

enum Outbound {
    Text(String),
    Close,
}

/// Opens WebSocket channels.
#[derive(Debug, Clone)]
pub struct WsConnector {
    outbound_buffer: usize,
    event_buffer: usize,
}

impl WsConnector {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            outbound_buffer: config.outbound_buffer.max(1),
            event_buffer: config.event_buffer.max(1),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(&StreamConfig::default())
    }
}

impl TransportConnector for WsConnector {
    fn open(&self, url: &str) -> StreamResult<OpenedChannel> {
        let parsed = url::Url::parse(url).map_err(|e| StreamError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(StreamError::InvalidUrl(format!(
                "expected ws:// or wss://, got {}",
                url
            )));
        }

        let (event_tx, event_rx) = mpsc::channel(self.event_buffer);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_buffer);
        let state = Arc::new(AtomicU8::new(CONNECTING));

        let task = tokio::spawn(run_socket(
            parsed.to_string(),
            Arc::clone(&state),
            event_tx,
            outbound_rx,
        ));

        Ok(OpenedChannel {
            channel: Box::new(WsChannel {
                state,
                outbound: outbound_tx,
                task,
            }),
            events: event_rx,
        })
    }
}

/// Handle to one WebSocket connection.
pub struct WsChannel {
    state: Arc<AtomicU8>,
    outbound: mpsc::Sender<Outbound>,
    task: JoinHandle<()>,
}

impl TransportChannel for WsChannel {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send(&mut self, payload: String) -> SendOutcome {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return SendOutcome::Dropped(DropReason::NotOpen(state));
        }

        match self.outbound.try_send(Outbound::Text(payload)) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => SendOutcome::Dropped(DropReason::Backpressure),
            Err(TrySendError::Closed(_)) => {
                SendOutcome::Dropped(DropReason::NotOpen(ReadyState::Closed))
            }
        }
    }

    fn close(&mut self) {
        // Still handshaking: abandon the attempt outright.
        if self
            .state
            .compare_exchange(CONNECTING, CLOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.task.abort();
            debug!("WebSocket closed before handshake completed");
            return;
        }

        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            && self.outbound.try_send(Outbound::Close).is_err()
        {
            // Writer is gone or wedged; drop the socket.
            self.state.store(CLOSED, Ordering::SeqCst);
            self.task.abort();
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn emit(events: &mpsc::Sender<TransportEvent>, event: TransportEvent) {
    if events.send(event).await.is_err() {
        debug!("Transport event dropped, session no longer listening");
    }
}

async fn run_socket(
    url: String,
    state: Arc<AtomicU8>,
    events: mpsc::Sender<TransportEvent>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    let mut stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("WebSocket connect to {} failed: {}", url, e);
            state.store(CLOSED, Ordering::SeqCst);
            emit(&events, TransportEvent::Error(e.to_string())).await;
            emit(
                &events,
                TransportEvent::Closed {
                    code: Some(ABNORMAL_CLOSURE),
                    reason: "connection failed".to_string(),
                },
            )
            .await;
            return;
        }
    };

    if state
        .compare_exchange(CONNECTING, OPEN, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        // Closed while the handshake was in flight.
        let _ = stream.close(None).await;
        return;
    }

    info!("WebSocket connected to {}", url);
    emit(&events, TransportEvent::Open).await;

    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(payload)) => {
                    if let Err(e) = sink.send(Message::Text(payload)).await {
                        warn!("WebSocket send failed: {}", e);
                        state.store(CLOSED, Ordering::SeqCst);
                        emit(&events, TransportEvent::Error(e.to_string())).await;
                        emit(&events, TransportEvent::Closed {
                            code: Some(ABNORMAL_CLOSURE),
                            reason: "send failed".to_string(),
                        }).await;
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    state.store(CLOSED, Ordering::SeqCst);
                    debug!("WebSocket to {} closed locally", url);
                    break;
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    emit(&events, TransportEvent::Message(text)).await;
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => emit(&events, TransportEvent::Message(text)).await,
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    state.store(CLOSED, Ordering::SeqCst);
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    info!("WebSocket closed by remote. Code: {:?}, Reason: {}", code, reason);
                    emit(&events, TransportEvent::Closed { code, reason }).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    state.store(CLOSED, Ordering::SeqCst);
                    emit(&events, TransportEvent::Error(e.to_string())).await;
                    emit(&events, TransportEvent::Closed {
                        code: Some(ABNORMAL_CLOSURE),
                        reason: e.to_string(),
                    }).await;
                    break;
                }
                None => {
                    state.store(CLOSED, Ordering::SeqCst);
                    emit(&events, TransportEvent::Closed {
                        code: Some(ABNORMAL_CLOSURE),
                        reason: "stream ended".to_string(),
                    }).await;
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_rejects_http_urls() {
        let connector = WsConnector::default();
        assert!(matches!(
            connector.open("http://localhost:8000/predict-stream"),
            Err(StreamError::InvalidUrl(_))
        ));
        assert!(matches!(
            connector.open("::nope::"),
            Err(StreamError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_close_while_connecting_is_idempotent() {
        // Nothing listens on port 9; the handshake cannot complete before close.
        let connector = WsConnector::default();
        let mut opened = connector.open("ws://127.0.0.1:9/predict-stream").unwrap();

        assert_eq!(opened.channel.ready_state(), ReadyState::Connecting);
        assert_eq!(
            opened.channel.send("data:image/jpeg;base64,AA==".to_string()),
            SendOutcome::Dropped(DropReason::NotOpen(ReadyState::Connecting))
        );

        opened.channel.close();
        opened.channel.close();
        assert_eq!(opened.channel.ready_state(), ReadyState::Closed);
    }
}
