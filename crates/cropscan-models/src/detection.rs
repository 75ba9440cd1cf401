//! Detection results produced by the inference service.
//!
//! The same shape is used for single-shot `/predict/image` responses and for
//! every JSON text frame received over the streaming WebSocket.

use serde::{Deserialize, Serialize};

/// Status tag marking a terminal, single-shot streaming result.
pub const CAPTURED_STATUS: &str = "captured";

/// One classified region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Disease label (e.g. "sauvebua")
    #[serde(rename = "class")]
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Bounding box as reported by the model (x1, y1, x2, y2)
    #[serde(rename = "box", default)]
    pub bbox: Vec<f64>,
    #[serde(default)]
    pub class_id: i64,
    #[serde(default)]
    pub track_id: Option<i64>,
}

/// Parsed inbound detection message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<Detection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<Detection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Annotated image, base64 without the data-URL prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_media_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl DetectionResult {
    /// Whether this is the terminal "captured" result of a stream.
    pub fn is_captured(&self) -> bool {
        self.status.as_deref() == Some(CAPTURED_STATUS)
    }

    /// Whether the message carries a detection list at all (possibly empty).
    pub fn has_detection_list(&self) -> bool {
        self.detections.is_some() || self.predictions.is_some()
    }

    /// Detections, preferring `detections` over `predictions`.
    pub fn items(&self) -> &[Detection] {
        self.detections
            .as_deref()
            .or(self.predictions.as_deref())
            .unwrap_or(&[])
    }

    pub fn count(&self) -> usize {
        self.items().len()
    }

    /// The detection with the highest confidence.
    pub fn best(&self) -> Option<&Detection> {
        self.items()
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    pub fn highest_confidence(&self) -> Option<f64> {
        self.best().map(|d| d.confidence)
    }

    /// Annotated image as a `data:` URL, if the service returned one.
    pub fn annotated_data_url(&self) -> Option<String> {
        let payload = self.processed_media_base64.as_deref()?;
        let media_type = self.media_type.as_deref().unwrap_or("image/jpeg");
        Some(format!("data:{};base64,{}", media_type, payload))
    }
}
