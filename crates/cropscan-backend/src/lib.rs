//! Backend client for the CropScan field app.
//!
//! This crate provides:
//! - Authentication (login, logout, token refresh) with locally stored credentials
//! - Disease lookup by detection label
//! - Plot options, image upload and disease-report filing
//!
//! Every response is wrapped in the backend's `{ success, data, message }`
//! envelope; `success == false` surfaces as [`BackendError::Rejected`].

pub mod client;
pub mod config;
pub mod error;
pub mod token_store;

pub use client::{BackendClient, ImageAttachment, DISEASE_MEDIA_DIRECTORY};
pub use config::BackendConfig;
pub use error::{BackendError, BackendResult};
pub use token_store::{
    FileTokenStore, MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, AUTH_DATA_KEY,
    REFRESH_TOKEN_KEY, SESSION_KEYS,
};
