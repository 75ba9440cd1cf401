//! Pre-session reachability check.

use async_trait::async_trait;

use cropscan_ai_client::AiClient;

/// Confirms the inference endpoint is reachable before a session starts.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self) -> bool;
}

#[async_trait]
impl HealthProbe for AiClient {
    async fn is_healthy(&self) -> bool {
        self.health_check().await
    }
}
