//! Result consumers.
//!
//! Callbacks run inside the session task between events. They must return
//! promptly; anything slow belongs on another task.

use tokio::sync::mpsc;

use cropscan_models::DetectionResult;

use crate::error::StreamError;
use crate::session::state::StopReason;

/// What to do with an interim detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep streaming
    Continue,
    /// Stop streaming and act on this result
    Act,
}

/// Receives detection results and session notifications.
pub trait DetectionConsumer: Send {
    /// An interim result with at least one detection.
    fn on_detection(&mut self, result: &DetectionResult) -> Decision;

    /// The terminal "captured" result. The session is already torn down.
    fn on_final(&mut self, result: DetectionResult);

    /// A recoverable problem: malformed message or failed capture.
    fn on_error(&mut self, error: &StreamError);

    /// The session returned to idle. Called once per run.
    fn on_stopped(&mut self, _reason: StopReason) {}
}

/// How a [`ChannelConsumer`] answers interim detections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecisionPolicy {
    /// Never stop on interim results
    Continue,
    /// Stop on the first interim result with any detection
    ActOnAny,
    /// Stop once some detection reaches the given confidence
    ActAbove(f64),
}

impl DecisionPolicy {
    pub fn decide(&self, result: &DetectionResult) -> Decision {
        match self {
            DecisionPolicy::Continue => Decision::Continue,
            DecisionPolicy::ActOnAny if result.count() > 0 => Decision::Act,
            DecisionPolicy::ActAbove(threshold)
                if result.highest_confidence().is_some_and(|c| c >= *threshold) =>
            {
                Decision::Act
            }
            _ => Decision::Continue,
        }
    }
}

/// Everything a session reports, as sent by [`ChannelConsumer`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Detection {
        result: DetectionResult,
        decision: Decision,
    },
    Final(DetectionResult),
    Error(StreamError),
    Stopped(StopReason),
}

/// Forwards session callbacks into an unbounded channel.
pub struct ChannelConsumer {
    tx: mpsc::UnboundedSender<SessionEvent>,
    policy: DecisionPolicy,
}

impl ChannelConsumer {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>, policy: DecisionPolicy) -> Self {
        Self { tx, policy }
    }

    fn forward(&self, event: SessionEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl DetectionConsumer for ChannelConsumer {
    fn on_detection(&mut self, result: &DetectionResult) -> Decision {
        let decision = self.policy.decide(result);
        self.forward(SessionEvent::Detection {
            result: result.clone(),
            decision,
        });
        decision
    }

    fn on_final(&mut self, result: DetectionResult) {
        self.forward(SessionEvent::Final(result));
    }

    fn on_error(&mut self, error: &StreamError) {
        self.forward(SessionEvent::Error(error.clone()));
    }

    fn on_stopped(&mut self, reason: StopReason) {
        self.forward(SessionEvent::Stopped(reason));
    }
}

/// Create a channel consumer and the receiving end of its events.
pub fn channel_consumer(
    policy: DecisionPolicy,
) -> (ChannelConsumer, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelConsumer::new(tx, policy), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropscan_models::Detection;

    fn result_with(confidences: &[f64]) -> DetectionResult {
        DetectionResult {
            detections: Some(
                confidences
                    .iter()
                    .map(|c| Detection {
                        label: "sauvebua".to_string(),
                        confidence: *c,
                        bbox: vec![],
                        class_id: 0,
                        track_id: None,
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_policies() {
        let weak = result_with(&[0.3]);
        let strong = result_with(&[0.3, 0.9]);
        let empty = result_with(&[]);

        assert_eq!(DecisionPolicy::Continue.decide(&strong), Decision::Continue);
        assert_eq!(DecisionPolicy::ActOnAny.decide(&weak), Decision::Act);
        assert_eq!(DecisionPolicy::ActOnAny.decide(&empty), Decision::Continue);
        assert_eq!(DecisionPolicy::ActAbove(0.8).decide(&weak), Decision::Continue);
        assert_eq!(DecisionPolicy::ActAbove(0.8).decide(&strong), Decision::Act);
    }

    #[test]
    fn test_channel_consumer_forwards() {
        let (mut consumer, mut rx) = channel_consumer(DecisionPolicy::ActOnAny);

        assert_eq!(consumer.on_detection(&result_with(&[0.5])), Decision::Act);
        consumer.on_stopped(StopReason::DetectionAccepted);

        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::Detection { decision: Decision::Act, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::Stopped(StopReason::DetectionAccepted)
        ));
    }

    #[test]
    fn test_channel_consumer_survives_dropped_receiver() {
        let (mut consumer, rx) = channel_consumer(DecisionPolicy::Continue);
        drop(rx);
        consumer.on_error(&StreamError::capture("camera busy"));
        consumer.on_final(DetectionResult::default());
    }
}
