//! Client for the plant-disease inference service.
//!
//! The service exposes a health endpoint, a single-shot image prediction
//! endpoint, and a WebSocket endpoint for real-time frame streaming. This
//! crate covers the HTTP side and derives the streaming URL; the streaming
//! session itself lives in `cropscan-stream`.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AiClient, AiClientConfig};
pub use error::{AiError, AiResult};
pub use types::HealthResponse;
