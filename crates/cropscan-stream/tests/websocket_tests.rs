//! WebSocket transport tests against a local tokio-tungstenite server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use cropscan_stream::{
    channel_consumer, DecisionPolicy, Frame, ReadyState, SendOutcome, SessionDeps, SessionEvent,
    SessionHandle, SessionState, StaticSource, StopReason, StreamConfig, TransportConnector,
    TransportEvent, WsConnector,
};

const WAIT: Duration = Duration::from_secs(5);

enum Reply {
    /// Answer every text frame with this payload
    Text(String),
    /// Close with 1011 after the first frame
    CloseWithError,
}

/// Accept one WebSocket connection, forwarding received text frames.
async fn spawn_server(reply: Reply) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let _ = tx.send(text);

            match &reply {
                Reply::Text(payload) => {
                    let _ = ws.send(Message::Text(payload.clone())).await;
                }
                Reply::CloseWithError => {
                    let _ = ws
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Error,
                            reason: "model crashed".into(),
                        })))
                        .await;
                }
            }
        }
    });

    (format!("ws://{}/predict-stream", addr), rx)
}

async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event stream ended")
}

#[tokio::test]
async fn test_channel_open_send_receive_close() {
    let (url, mut received) = spawn_server(Reply::Text(r#"{"detections": []}"#.into())).await;
    let connector = WsConnector::default();
    let mut opened = connector.open(&url).unwrap();

    assert_eq!(next_event(&mut opened.events).await, TransportEvent::Open);
    assert_eq!(opened.channel.ready_state(), ReadyState::Open);

    let payload = Frame::new(vec![1, 2, 3], "image/jpeg").to_data_url();
    assert_eq!(opened.channel.send(payload.clone()), SendOutcome::Sent);

    let got = timeout(WAIT, received.recv()).await.unwrap().unwrap();
    assert_eq!(got, payload);
    assert_eq!(
        next_event(&mut opened.events).await,
        TransportEvent::Message(r#"{"detections": []}"#.to_string())
    );

    opened.channel.close();
    opened.channel.close();
    assert_ne!(opened.channel.ready_state(), ReadyState::Open);
    assert!(matches!(
        opened.channel.send("late".to_string()),
        SendOutcome::Dropped(_)
    ));
}

#[tokio::test]
async fn test_connect_failure_emits_error_then_close() {
    // Bind then drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = WsConnector::default();
    let mut opened = connector
        .open(&format!("ws://{}/predict-stream", addr))
        .unwrap();

    assert!(matches!(
        next_event(&mut opened.events).await,
        TransportEvent::Error(_)
    ));
    assert!(matches!(
        next_event(&mut opened.events).await,
        TransportEvent::Closed { .. }
    ));
    assert_eq!(opened.channel.ready_state(), ReadyState::Closed);
}

#[tokio::test]
async fn test_remote_close_reports_code() {
    let (url, _received) = spawn_server(Reply::CloseWithError).await;
    let connector = WsConnector::default();
    let mut opened = connector.open(&url).unwrap();

    assert_eq!(next_event(&mut opened.events).await, TransportEvent::Open);
    opened.channel.send("data:image/jpeg;base64,AA==".to_string());

    match next_event(&mut opened.events).await {
        TransportEvent::Closed { code, reason } => {
            assert_eq!(code, Some(1011));
            assert_eq!(reason, "model crashed");
        }
        other => panic!("expected close, got {:?}", other),
    }
}

#[tokio::test]
async fn test_session_streams_until_captured() {
    let (url, mut received) = spawn_server(Reply::Text(
        r#"{"status": "captured", "detections": [{"class": "khodomoi", "confidence": 0.87, "box": [0, 0, 10, 10], "class_id": 1}]}"#
            .into(),
    ))
    .await;

    let config = StreamConfig {
        capture_interval: Duration::from_millis(50),
        ..StreamConfig::default()
    };
    let deps = SessionDeps::new(
        Arc::new(WsConnector::new(&config)),
        Arc::new(StaticSource::new(Frame::new(vec![0xFF, 0xD8], "image/jpeg"))),
    );
    let (consumer, mut events) = channel_consumer(DecisionPolicy::Continue);
    let handle = SessionHandle::spawn(config, url, deps, consumer);

    handle.start().await.unwrap();
    assert_eq!(handle.state(), SessionState::Streaming);

    let frame = timeout(WAIT, received.recv()).await.unwrap().unwrap();
    assert!(frame.starts_with("data:image/jpeg;base64,"));

    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        SessionEvent::Final(result) => {
            assert_eq!(result.best().map(|d| d.label.as_str()), Some("khodomoi"));
        }
        other => panic!("expected final result, got {:?}", other),
    }
    assert!(matches!(
        timeout(WAIT, events.recv()).await.unwrap().unwrap(),
        SessionEvent::Stopped(StopReason::FinalResult)
    ));

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.channel_live);
    assert!(snapshot.frame_counter >= 1);
}
