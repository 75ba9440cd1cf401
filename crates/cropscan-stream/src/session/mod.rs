//! Detection streaming sessions.
//!
//! A [`SessionHandle`] controls one session task. The task opens a transport
//! channel, waits (bounded) for it to open, then captures and sends a frame on
//! every tick of a fixed-interval timer until the session stops. Results are
//! delivered to a [`DetectionConsumer`] on the session task.
//!
//! Dropping every handle cancels the session.

mod consumer;
mod controller;
mod state;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;

use cropscan_ai_client::AiClient;

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::frame::FrameSource;
use crate::health::HealthProbe;
use crate::transport::{TransportConnector, WsConnector};

use controller::{Command, SessionActor};

pub use consumer::{
    channel_consumer, ChannelConsumer, Decision, DecisionPolicy, DetectionConsumer, SessionEvent,
};
pub use state::{SessionSnapshot, SessionState, StopReason};

/// Injected collaborators of a session.
#[derive(Clone)]
pub struct SessionDeps {
    pub connector: Arc<dyn TransportConnector>,
    pub source: Arc<dyn FrameSource>,
    /// Checked before every start when set
    pub health: Option<Arc<dyn HealthProbe>>,
}

impl SessionDeps {
    pub fn new(connector: Arc<dyn TransportConnector>, source: Arc<dyn FrameSource>) -> Self {
        Self {
            connector,
            source,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<dyn HealthProbe>) -> Self {
        self.health = Some(health);
        self
    }
}

/// Handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    health: Option<Arc<dyn HealthProbe>>,
}

impl SessionHandle {
    /// Spawn a session task on the current runtime. The session starts idle.
    pub fn spawn(
        config: StreamConfig,
        url: impl Into<String>,
        deps: SessionDeps,
        consumer: impl DetectionConsumer + 'static,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let actor = SessionActor::new(
            config,
            url.into(),
            deps.connector,
            deps.source,
            Box::new(consumer),
            commands_rx,
            snapshot_tx,
        );
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            health: deps.health,
        }
    }

    /// Spawn a session streaming to `client`'s WebSocket endpoint, with the
    /// client as health probe.
    pub fn for_service(
        client: Arc<AiClient>,
        source: Arc<dyn FrameSource>,
        config: StreamConfig,
        consumer: impl DetectionConsumer + 'static,
    ) -> StreamResult<Self> {
        let url = client
            .stream_url()
            .map_err(|e| StreamError::InvalidUrl(e.to_string()))?;
        let deps = SessionDeps::new(Arc::new(WsConnector::new(&config)), source)
            .with_health(client);
        Ok(Self::spawn(config, url, deps, consumer))
    }

    /// Start streaming.
    ///
    /// Resolves once the channel is open and the capture timer runs, or with
    /// the reason it could not get there.
    pub async fn start(&self) -> StreamResult<()> {
        if !self.snapshot.borrow().is_idle() {
            return Err(StreamError::AlreadyStreaming);
        }

        if let Some(health) = &self.health {
            if !health.is_healthy().await {
                warn!("Inference service failed its health check");
                return Err(StreamError::ServiceUnavailable(
                    "inference service is not ready".to_string(),
                ));
            }
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start { reply })
            .await
            .map_err(|_| StreamError::SessionClosed)?;
        response.await.map_err(|_| StreamError::SessionClosed)?
    }

    /// Stop streaming. A no-op when nothing is running.
    pub async fn stop(&self) {
        self.send_stop(StopReason::Requested).await;
    }

    /// Stop streaming because the owner is going away. Same teardown as
    /// [`stop`](Self::stop), reported as [`StopReason::Cancelled`].
    pub async fn cancel(&self) {
        self.send_stop(StopReason::Cancelled).await;
    }

    async fn send_stop(&self, reason: StopReason) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Stop { reason, reply }).await.is_ok() {
            let _ = done.await;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn is_streaming(&self) -> bool {
        self.snapshot.borrow().is_streaming()
    }

    /// Watch snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }
}
