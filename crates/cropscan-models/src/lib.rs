//! Shared data models for the CropScan field client.
//!
//! This crate provides Serde-serializable types for:
//! - Inference-service detection results (streaming and single-shot)
//! - The uniform backend response envelope
//! - Authentication and user records
//! - Disease metadata, disease-log reports and media uploads
//! - Plot options

pub mod auth;
pub mod detection;
pub mod disease;
pub mod envelope;
pub mod plot;

// Re-export common types
pub use auth::{LoginCredentials, LoginData, TokenPair, User};
pub use detection::{Detection, DetectionResult, CAPTURED_STATUS};
pub use disease::{DiseaseInfo, DiseaseLogRecord, DiseaseLogRequest, MediaUpload};
pub use envelope::{ApiEnvelope, EnvelopeError};
pub use plot::PlotOption;
