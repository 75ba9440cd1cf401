//! Inference service HTTP client.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use cropscan_models::DetectionResult;

use crate::error::{AiError, AiResult};
use crate::types::HealthResponse;

/// Path of the real-time streaming endpoint.
pub const STREAM_PATH: &str = "/predict-stream";

/// Path of the single-shot prediction endpoint.
pub const PREDICT_IMAGE_PATH: &str = "/predict/image";

/// Configuration for the inference client.
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    /// Base URL of the inference service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
}

impl Default for AiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

impl AiClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("AI_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            timeout: Duration::from_secs(
                std::env::var("AI_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("AI_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

/// Client for the inference service.
pub struct AiClient {
    http: Client,
    config: AiClientConfig,
}

impl AiClient {
    /// Create a new inference client.
    pub fn new(config: AiClientConfig) -> AiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(AiError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> AiResult<Self> {
        Self::new(AiClientConfig::from_env())
    }

    pub fn config(&self) -> &AiClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the inference service is reachable and reports `status: "ok"`.
    ///
    /// Never fails; any transport or decode problem counts as unhealthy.
    pub async fn health_check(&self) -> bool {
        let url = self.endpoint("/");

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(health) => health.is_ok(),
                    Err(e) => {
                        warn!("AI service health response unreadable: {}", e);
                        false
                    }
                }
            }
            Ok(response) => {
                warn!("AI service health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("AI service health check error: {}", e);
                false
            }
        }
    }

    /// Run single-shot detection on one image.
    pub async fn detect_image(
        &self,
        image: &[u8],
        file_name: &str,
        mime: &str,
    ) -> AiResult<DetectionResult> {
        let url = self.endpoint(PREDICT_IMAGE_PATH);

        debug!(
            "Sending {} byte image to {} for detection",
            image.len(),
            url
        );

        let response = self
            .with_retry(|| async {
                let part = Part::bytes(image.to_vec())
                    .file_name(file_name.to_string())
                    .mime_str(mime)?;
                let form = Form::new().part("file", part);

                let response = self
                    .http
                    .post(&url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(AiError::Network)?;

                if response.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Err(AiError::ServiceUnavailable(format!(
                        "{} returned 503",
                        url
                    )));
                }
                Ok(response)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::RequestFailed(format!(
                "AI service returned {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AiError::InvalidResponse(e.to_string()))
    }

    /// WebSocket URL of the streaming endpoint.
    ///
    /// `http` becomes `ws` and `https` becomes `wss`; any base path is kept.
    pub fn stream_url(&self) -> AiResult<String> {
        stream_url_for(&self.config.base_url)
    }

    /// Run `operation`, retrying retryable failures up to `max_retries` times.
    ///
    /// The outcome of the last attempt is returned as is.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> AiResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AiResult<T>>,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    let delay = backoff_delay(retries);
                    retries += 1;
                    warn!(
                        "AI request failed (attempt {} of {}), retrying in {:?}: {}",
                        retries,
                        self.config.max_retries.saturating_add(1),
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Wait before retry number `retry` (0-based): 500ms, doubling, capped at 30s.
fn backoff_delay(retry: u32) -> Duration {
    let millis = 500u64.saturating_mul(1u64 << retry.min(16));
    Duration::from_millis(millis.min(30_000))
}

/// Derive the streaming WebSocket URL from an HTTP base URL.
pub fn stream_url_for(base_url: &str) -> AiResult<String> {
    let mut url = Url::parse(base_url).map_err(|e| AiError::InvalidUrl(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(AiError::InvalidUrl(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| AiError::InvalidUrl(format!("cannot switch {} to {}", base_url, scheme)))?;

    let path = format!("{}{}", url.path().trim_end_matches('/'), STREAM_PATH);
    url.set_path(&path);

    Ok(url.to_string())
}
