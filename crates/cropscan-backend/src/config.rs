//! Backend client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default location of the persisted session.
pub const DEFAULT_SESSION_FILE: &str = ".cropscan/session.json";

/// Configuration for the backend client.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL including the API prefix (e.g. `http://host:3000/api`)
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Where `FileTokenStore` keeps credentials
    pub session_file: PathBuf,
    /// Drop stored credentials on `initialize()`
    pub clear_session_on_start: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout: Duration::from_secs(30),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            clear_session_on_start: true,
        }
    }
}

impl BackendConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api".to_string()),
            timeout: Duration::from_secs(
                std::env::var("BACKEND_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            session_file: std::env::var("CROPSCAN_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE)),
            clear_session_on_start: std::env::var("CROPSCAN_CLEAR_SESSION_ON_START")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
