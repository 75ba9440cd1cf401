//! Fakes shared by the session tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use cropscan_stream::{
    DropReason, Frame, FrameSource, HealthProbe, OpenedChannel, ReadyState, SendOutcome,
    StreamError, StreamResult, TransportChannel, TransportConnector, TransportEvent,
};

pub const JPEG_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Default)]
struct Counters {
    opened: usize,
    live: usize,
    max_live: usize,
}

/// Test-side view of one fake channel.
#[derive(Clone)]
pub struct ChannelProbe {
    state: Arc<Mutex<ReadyState>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    events: mpsc::Sender<TransportEvent>,
}

impl ChannelProbe {
    pub async fn open(&self) {
        self.set_state(ReadyState::Open);
        let _ = self.events.send(TransportEvent::Open).await;
    }

    pub async fn message(&self, text: &str) {
        let _ = self
            .events
            .send(TransportEvent::Message(text.to_string()))
            .await;
    }

    pub async fn error(&self, error: &str) {
        self.set_state(ReadyState::Closed);
        let _ = self
            .events
            .send(TransportEvent::Error(error.to_string()))
            .await;
    }

    pub async fn remote_close(&self, code: u16, reason: &str) {
        self.set_state(ReadyState::Closed);
        let _ = self
            .events
            .send(TransportEvent::Closed {
                code: Some(code),
                reason: reason.to_string(),
            })
            .await;
    }

    pub fn set_state(&self, state: ReadyState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeChannel {
    probe: ChannelProbe,
    counters: Arc<Mutex<Counters>>,
}

impl TransportChannel for FakeChannel {
    fn ready_state(&self) -> ReadyState {
        *self.probe.state.lock().unwrap()
    }

    fn send(&mut self, payload: String) -> SendOutcome {
        match self.ready_state() {
            ReadyState::Open => {
                self.probe.sent.lock().unwrap().push(payload);
                SendOutcome::Sent
            }
            state => SendOutcome::Dropped(DropReason::NotOpen(state)),
        }
    }

    fn close(&mut self) {
        if !self.probe.closed.swap(true, Ordering::SeqCst) {
            self.probe.set_state(ReadyState::Closed);
            self.counters.lock().unwrap().live -= 1;
        }
    }
}

/// Connector handing out fake channels that the test drives by hand.
#[derive(Clone, Default)]
pub struct FakeConnector {
    counters: Arc<Mutex<Counters>>,
    probes: Arc<Mutex<Vec<ChannelProbe>>>,
    fail_open: Arc<AtomicBool>,
    open_immediately: Arc<AtomicBool>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels come back already open, as if the handshake had finished.
    pub fn open_immediately(self) -> Self {
        self.open_immediately.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn channel(&self, index: usize) -> ChannelProbe {
        self.probes.lock().unwrap()[index].clone()
    }

    pub fn last_channel(&self) -> ChannelProbe {
        let probes = self.probes.lock().unwrap();
        let probe = probes.last().cloned().expect("no channel opened yet");
        probe
    }

    pub fn opened(&self) -> usize {
        self.counters.lock().unwrap().opened
    }

    pub fn live(&self) -> usize {
        self.counters.lock().unwrap().live
    }

    pub fn max_live(&self) -> usize {
        self.counters.lock().unwrap().max_live
    }
}

impl TransportConnector for FakeConnector {
    fn open(&self, url: &str) -> StreamResult<OpenedChannel> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(StreamError::InvalidUrl(url.to_string()));
        }

        let initial = if self.open_immediately.load(Ordering::SeqCst) {
            ReadyState::Open
        } else {
            ReadyState::Connecting
        };
        let (events_tx, events_rx) = mpsc::channel(16);
        let probe = ChannelProbe {
            state: Arc::new(Mutex::new(initial)),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            events: events_tx,
        };

        {
            let mut counters = self.counters.lock().unwrap();
            counters.opened += 1;
            counters.live += 1;
            counters.max_live = counters.max_live.max(counters.live);
        }
        self.probes.lock().unwrap().push(probe.clone());

        Ok(OpenedChannel {
            channel: Box::new(FakeChannel {
                probe,
                counters: Arc::clone(&self.counters),
            }),
            events: events_rx,
        })
    }
}

pub fn jpeg_frame() -> Frame {
    Frame::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10], "image/jpeg")
}

/// Fails every capture.
pub struct FailingSource;

#[async_trait]
impl FrameSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn capture_frame(&self) -> StreamResult<Frame> {
        Err(StreamError::capture("camera not ready"))
    }
}

/// Takes `delay` per capture.
pub struct SlowSource {
    pub delay: Duration,
}

#[async_trait]
impl FrameSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    async fn capture_frame(&self) -> StreamResult<Frame> {
        tokio::time::sleep(self.delay).await;
        Ok(jpeg_frame())
    }
}

/// Numbers its captures and sleeps a per-capture delay.
///
/// Capture `n` takes `delays[n]` (the last delay repeats) and yields a frame
/// whose final byte is `n`. Tracks how many captures run at once; a capture
/// dropped mid-sleep stops counting as running.
#[derive(Clone)]
pub struct SequencedSource {
    delays: Arc<Vec<Duration>>,
    started: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

struct Running(Arc<AtomicUsize>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SequencedSource {
    pub fn new(delays: &[Duration]) -> Self {
        Self {
            delays: Arc::new(delays.to_vec()),
            started: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Capture index carried by a sent payload.
    pub fn index_of(payload: &str) -> u8 {
        let (_, data) = cropscan_stream::encoding::decode_data_url(payload).unwrap();
        *data.last().unwrap()
    }
}

#[async_trait]
impl FrameSource for SequencedSource {
    fn name(&self) -> &str {
        "sequenced"
    }

    async fn capture_frame(&self) -> StreamResult<Frame> {
        let index = self.started.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);
        let _running = Running(Arc::clone(&self.running));

        let delay = self
            .delays
            .get(index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or_default();
        tokio::time::sleep(delay).await;

        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.push(index as u8);
        Ok(Frame::new(data, "image/jpeg"))
    }
}

pub struct FixedHealth(pub bool);

#[async_trait]
impl HealthProbe for FixedHealth {
    async fn is_healthy(&self) -> bool {
        self.0
    }
}

/// Let every runnable task run to its next await point.
///
/// With a paused clock this also advances time by one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn detections_json(status: &str, confidences: &[f64]) -> String {
    let detections: Vec<serde_json::Value> = confidences
        .iter()
        .enumerate()
        .map(|(i, confidence)| {
            serde_json::json!({
                "class": "sauvebua",
                "confidence": confidence,
                "box": [10.0, 20.0, 110.0, 220.0],
                "class_id": 3,
                "track_id": i,
            })
        })
        .collect();
    serde_json::json!({ "status": status, "detections": detections }).to_string()
}
