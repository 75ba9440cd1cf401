//! The session task.
//!
//! One task owns the channel, its event receiver, the capture timer and the
//! connect deadline. Commands, transport events, timer ticks and finished
//! captures are handled one at a time, so no state is shared across tasks.

use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cropscan_models::DetectionResult;

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::frame::{Frame, FrameSource};
use crate::metrics;
use crate::session::consumer::{Decision, DetectionConsumer};
use crate::session::state::{SessionSnapshot, SessionState, StopReason};
use crate::transport::{
    ReadyState, SendOutcome, TransportChannel, TransportConnector, TransportEvent,
};

pub(crate) enum Command {
    Start {
        reply: oneshot::Sender<StreamResult<()>>,
    },
    Stop {
        reason: StopReason,
        reply: oneshot::Sender<()>,
    },
}

/// A finished capture, tagged with the epoch it was started in.
struct CaptureDone {
    epoch: u64,
    result: StreamResult<Frame>,
}

pub(crate) struct SessionActor {
    config: StreamConfig,
    url: String,
    connector: Arc<dyn TransportConnector>,
    source: Arc<dyn FrameSource>,
    consumer: Box<dyn DetectionConsumer>,
    commands: mpsc::Receiver<Command>,
    captures_tx: mpsc::UnboundedSender<CaptureDone>,
    captures_rx: mpsc::UnboundedReceiver<CaptureDone>,
    snapshot: watch::Sender<SessionSnapshot>,

    state: SessionState,
    session_id: Option<Uuid>,
    /// Bumped on every start and teardown; captures from older epochs are stale
    epoch: u64,
    channel: Option<Box<dyn TransportChannel>>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    ticker: Option<Interval>,
    connect_deadline: Option<Pin<Box<Sleep>>>,
    /// Pending `start()` reply; taken by whichever of open/error/close/timeout/stop comes first
    connect_wait: Option<oneshot::Sender<StreamResult<()>>>,
    /// The capture started by the last accepted tick, until it reports back
    capture: Option<JoinHandle<()>>,
    frame_counter: u64,
    last_frame_at: Option<DateTime<Utc>>,
    last_result: Option<DetectionResult>,
}

impl SessionActor {
    pub(crate) fn new(
        config: StreamConfig,
        url: String,
        connector: Arc<dyn TransportConnector>,
        source: Arc<dyn FrameSource>,
        consumer: Box<dyn DetectionConsumer>,
        commands: mpsc::Receiver<Command>,
        snapshot: watch::Sender<SessionSnapshot>,
    ) -> Self {
        let (captures_tx, captures_rx) = mpsc::unbounded_channel();
        Self {
            config,
            url,
            connector,
            source,
            consumer,
            commands,
            captures_tx,
            captures_rx,
            snapshot,
            state: SessionState::Idle,
            session_id: None,
            epoch: 0,
            channel: None,
            events: None,
            ticker: None,
            connect_deadline: None,
            connect_wait: None,
            capture: None,
            frame_counter: 0,
            last_frame_at: None,
            last_result: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Session task started for {}", self.url);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Start { reply }) => self.start_session(reply),
                    Some(Command::Stop { reason, reply }) => {
                        self.stop_session(reason);
                        let _ = reply.send(());
                    }
                    None => {
                        // Every handle is gone.
                        self.stop_session(StopReason::Cancelled);
                        break;
                    }
                },
                event = next_event(&mut self.events) => self.handle_event(event),
                _ = next_tick(&mut self.ticker) => self.handle_tick(),
                _ = deadline(&mut self.connect_deadline) => self.handle_connect_timeout(),
                Some(done) = self.captures_rx.recv() => self.handle_capture(done),
            }
            self.publish();
        }

        debug!("Session task for {} finished", self.url);
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            state: self.state,
            session_id: self.session_id,
            frame_counter: self.frame_counter,
            last_frame_at: self.last_frame_at,
            channel_live: self.channel.is_some(),
            timer_active: self.ticker.is_some(),
            last_result: self.last_result.clone(),
        };
        self.snapshot.send_replace(snapshot);
    }

    fn channel_state(&self) -> Option<ReadyState> {
        self.channel.as_ref().map(|channel| channel.ready_state())
    }

    fn start_session(&mut self, reply: oneshot::Sender<StreamResult<()>>) {
        if self.state != SessionState::Idle {
            warn!("Start rejected: session is {}", self.state);
            let _ = reply.send(Err(StreamError::AlreadyStreaming));
            return;
        }

        let opened = match self.connector.open(&self.url) {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Failed to open stream to {}: {}", self.url, e);
                metrics::record_connect_failure("open");
                let _ = reply.send(Err(e));
                return;
            }
        };

        self.epoch += 1;
        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.state = SessionState::Connecting;
        self.frame_counter = 0;
        self.last_frame_at = None;
        self.last_result = None;
        let already_open = opened.channel.ready_state() == ReadyState::Open;
        self.channel = Some(opened.channel);
        self.events = Some(opened.events);
        self.connect_deadline = Some(Box::pin(sleep(self.config.connect_timeout)));
        self.connect_wait = Some(reply);

        info!(
            session_id = %session_id,
            url = %self.url,
            timeout_ms = self.config.connect_timeout.as_millis() as u64,
            "Connecting detection stream"
        );
        self.publish();

        if already_open {
            self.resolve_connect(Ok(()));
        }
    }

    /// Settle the pending connect wait. Only the first call has any effect.
    fn resolve_connect(&mut self, outcome: Result<(), StopReason>) {
        let Some(wait) = self.connect_wait.take() else {
            return;
        };
        self.connect_deadline = None;

        let outcome = outcome.and_then(|()| match self.channel_state() {
            Some(ReadyState::Open) => Ok(()),
            Some(state) => Err(StopReason::ConnectFailed(format!(
                "channel is {} after open",
                state.as_str()
            ))),
            None => Err(StopReason::ConnectFailed("channel missing".to_string())),
        });

        match outcome {
            Ok(()) => {
                let period = self.config.capture_period();
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                self.state = SessionState::Streaming;
                self.frame_counter = 0;
                self.last_frame_at = None;
                self.ticker = Some(ticker);

                metrics::record_session_started();
                info!(
                    session_id = ?self.session_id,
                    interval_ms = period.as_millis() as u64,
                    "Detection stream open"
                );
                self.publish();
                let _ = wait.send(Ok(()));
            }
            Err(reason) => {
                metrics::record_connect_failure(reason.label());
                let error = match &reason {
                    StopReason::ConnectTimeout => {
                        StreamError::ConnectTimeout(self.config.connect_timeout)
                    }
                    StopReason::ConnectFailed(e) => StreamError::ConnectFailed(e.clone()),
                    other => StreamError::ConnectFailed(other.to_string()),
                };
                self.stop_session(reason);
                let _ = wait.send(Err(error));
            }
        }
    }

    fn handle_connect_timeout(&mut self) {
        self.connect_deadline = None;
        if self.state == SessionState::Connecting {
            warn!(
                session_id = ?self.session_id,
                "No open acknowledgment within {:?}",
                self.config.connect_timeout
            );
            self.resolve_connect(Err(StopReason::ConnectTimeout));
        }
    }

    fn handle_event(&mut self, event: Option<TransportEvent>) {
        let event = match event {
            Some(event) => event,
            None => {
                // The transport dropped its sender without a close event.
                self.events = None;
                TransportEvent::Closed {
                    code: None,
                    reason: "event stream ended".to_string(),
                }
            }
        };

        match (self.state, event) {
            (SessionState::Connecting, TransportEvent::Open) => self.resolve_connect(Ok(())),
            (SessionState::Connecting, TransportEvent::Error(e)) => {
                self.resolve_connect(Err(StopReason::ConnectFailed(e)))
            }
            (SessionState::Connecting, TransportEvent::Closed { code, reason }) => {
                let detail = match code {
                    Some(code) => format!("closed during handshake ({}): {}", code, reason),
                    None => format!("closed during handshake: {}", reason),
                };
                self.resolve_connect(Err(StopReason::ConnectFailed(detail)))
            }
            (SessionState::Streaming, TransportEvent::Message(text)) => self.handle_message(&text),
            (SessionState::Streaming, TransportEvent::Error(e)) => {
                warn!(session_id = ?self.session_id, "Stream transport error: {}", e);
                self.stop_session(StopReason::TransportError(e));
            }
            (SessionState::Streaming, TransportEvent::Closed { code, reason }) => {
                info!(
                    session_id = ?self.session_id,
                    "Stream closed by remote. Code: {:?}, Reason: {}",
                    code,
                    reason
                );
                self.stop_session(StopReason::RemoteClosed { code, reason });
            }
            (state, event) => {
                debug!("Ignoring {} event while {}", event.kind(), state);
            }
        }
    }

    fn handle_tick(&mut self) {
        if self.state != SessionState::Streaming {
            return;
        }

        match self.channel_state() {
            Some(ReadyState::Open) => {}
            state => {
                debug!(
                    "Skipping capture, channel is {}",
                    state.map(|s| s.as_str()).unwrap_or("missing")
                );
                metrics::record_frame_dropped("not_open");
                return;
            }
        }

        // One capture at a time keeps frames in tick order.
        if self.capture.is_some() {
            debug!(session_id = ?self.session_id, "Skipping capture, previous one still running");
            metrics::record_frame_dropped("busy");
            return;
        }

        let epoch = self.epoch;
        let source = Arc::clone(&self.source);
        let done = self.captures_tx.clone();
        self.capture = Some(tokio::spawn(async move {
            let result = source.capture_frame().await;
            let _ = done.send(CaptureDone { epoch, result });
        }));
    }

    fn handle_capture(&mut self, done: CaptureDone) {
        if done.epoch == self.epoch {
            self.capture = None;
        }
        if done.epoch != self.epoch || self.state != SessionState::Streaming {
            debug!("Discarding capture from a finished session");
            return;
        }

        match done.result {
            Ok(frame) => self.transmit(frame),
            Err(e) => {
                warn!(session_id = ?self.session_id, "Frame capture failed: {}", e);
                metrics::record_capture_failure();
                self.consumer.on_error(&e);
            }
        }
    }

    fn transmit(&mut self, frame: Frame) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };

        let payload = frame.to_data_url();
        let payload_len = payload.len();
        match channel.send(payload) {
            SendOutcome::Sent => {
                self.frame_counter += 1;
                self.last_frame_at = Some(Utc::now());
                metrics::record_frame_sent(payload_len);
                debug!(
                    session_id = ?self.session_id,
                    frame = self.frame_counter,
                    bytes = payload_len,
                    "Frame sent"
                );
            }
            SendOutcome::Dropped(reason) => {
                metrics::record_frame_dropped(reason.as_str());
                debug!("Frame dropped: {}", reason.as_str());
            }
        }
    }

    fn handle_message(&mut self, text: &str) {
        metrics::record_message_received();

        let result: DetectionResult = match serde_json::from_str(text) {
            Ok(result) => result,
            Err(e) => {
                warn!(session_id = ?self.session_id, "Malformed detection message: {}", e);
                metrics::record_malformed_message();
                self.consumer
                    .on_error(&StreamError::MalformedMessage(e.to_string()));
                return;
            }
        };

        if result.is_captured() {
            info!(
                session_id = ?self.session_id,
                detections = result.count(),
                "Final detection received"
            );
            if self.teardown(&StopReason::FinalResult) {
                self.publish();
                self.consumer.on_final(result);
                self.consumer.on_stopped(StopReason::FinalResult);
            }
            return;
        }

        if !result.has_detection_list() {
            debug!(
                "Ignoring message without detections (status: {:?}, message: {:?})",
                result.status, result.message
            );
            return;
        }

        let count = result.count();
        self.last_result = Some(result);
        if count == 0 {
            return;
        }

        let decision = match self.last_result.as_ref() {
            Some(result) => self.consumer.on_detection(result),
            None => Decision::Continue,
        };
        if decision == Decision::Act {
            self.stop_session(StopReason::DetectionAccepted);
        }
    }

    /// Tear down the current run and notify the consumer once.
    fn stop_session(&mut self, reason: StopReason) {
        if self.teardown(&reason) {
            self.consumer.on_stopped(reason);
        }
    }

    /// Release the timer and the channel and return to `Idle`.
    ///
    /// Returns `false` when there was nothing to tear down.
    fn teardown(&mut self, reason: &StopReason) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }
        let was_streaming = self.state == SessionState::Streaming;
        self.state = SessionState::Stopping;

        self.ticker = None;
        self.connect_deadline = None;
        if let Some(capture) = self.capture.take() {
            capture.abort();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.events = None;
        self.last_result = None;
        self.epoch += 1;
        let pending = self.connect_wait.take();

        self.state = SessionState::Idle;
        if was_streaming {
            metrics::record_session_ended(reason.label());
        }
        info!(
            session_id = ?self.session_id,
            frames = self.frame_counter,
            "Detection session stopped: {}",
            reason
        );
        self.session_id = None;
        self.publish();

        if let Some(wait) = pending {
            let _ = wait.send(Err(StreamError::Cancelled));
        }
        true
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn deadline(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
