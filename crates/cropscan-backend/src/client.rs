//! Backend REST client.

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use cropscan_models::{
    ApiEnvelope, DetectionResult, DiseaseInfo, DiseaseLogRecord, DiseaseLogRequest,
    LoginCredentials, LoginData, MediaUpload, PlotOption, TokenPair, User,
};

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::token_store::{
    FileTokenStore, TokenStore, ACCESS_TOKEN_KEY, AUTH_DATA_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS,
};

/// Media directory that disease photos are filed under.
pub const DISEASE_MEDIA_DIRECTORY: i64 = 15;

/// An image to attach to a disease report.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub data: Vec<u8>,
    pub file_name: String,
}

/// Client for the farm-management backend.
pub struct BackendClient {
    http: Client,
    config: BackendConfig,
    store: Arc<dyn TokenStore>,
}

impl BackendClient {
    /// Create a new backend client.
    pub fn new(config: BackendConfig, store: Arc<dyn TokenStore>) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(BackendError::Network)?;

        Ok(Self {
            http,
            config,
            store,
        })
    }

    /// Create from environment variables, storing credentials on disk.
    pub fn from_env() -> BackendResult<Self> {
        let config = BackendConfig::from_env();
        let store = Arc::new(FileTokenStore::new(config.session_file.clone()));
        Self::new(config, store)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Prepare stored credentials for use.
    ///
    /// With `clear_session_on_start` every run begins logged out.
    pub async fn initialize(&self) -> BackendResult<()> {
        if self.config.clear_session_on_start {
            debug!("Clearing stored session on start");
            return self.store.remove_many(&SESSION_KEYS).await;
        }

        if self.store.get(ACCESS_TOKEN_KEY).await?.is_some() {
            info!("Restored stored session");
        }
        Ok(())
    }

    /// Log in and store the issued tokens together with the user record.
    pub async fn login(&self, credentials: &LoginCredentials) -> BackendResult<User> {
        let request = self.http.post(self.endpoint("/auth/login")).json(credentials);
        let data: LoginData = self.send(request).await?.into_data()?;

        let user_json = serde_json::to_string(&data.user)?;
        self.store
            .set_many(&[
                (ACCESS_TOKEN_KEY, data.access_token.as_str()),
                (REFRESH_TOKEN_KEY, data.refresh_token.as_str()),
                (AUTH_DATA_KEY, user_json.as_str()),
            ])
            .await?;

        info!("Logged in as {} ({})", data.user.name, data.user.role);
        Ok(data.user)
    }

    /// Forget all stored credentials.
    pub async fn logout(&self) -> BackendResult<()> {
        self.store.remove_many(&SESSION_KEYS).await?;
        info!("Logged out");
        Ok(())
    }

    /// Exchange the stored refresh token for a new token pair.
    pub async fn refresh(&self) -> BackendResult<TokenPair> {
        let refresh_token = self
            .store
            .get(REFRESH_TOKEN_KEY)
            .await?
            .ok_or_else(|| BackendError::unauthorized("no refresh token stored"))?;

        let request = self
            .http
            .post(self.endpoint("/auth/refresh"))
            .json(&serde_json::json!({ "refreshToken": refresh_token }));
        let pair: TokenPair = self.send(request).await?.into_data()?;

        self.store
            .set_many(&[
                (ACCESS_TOKEN_KEY, pair.access_token.as_str()),
                (REFRESH_TOKEN_KEY, pair.refresh_token.as_str()),
            ])
            .await?;

        debug!("Access token refreshed");
        Ok(pair)
    }

    /// The stored user record, if any.
    ///
    /// An unreadable record counts as logged out.
    pub async fn current_user(&self) -> BackendResult<Option<User>> {
        let Some(raw) = self.store.get(AUTH_DATA_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!("Stored user record is unreadable: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(self.store.get(ACCESS_TOKEN_KEY).await, Ok(Some(_)))
    }

    /// Diseases registered under a detection label. Unknown labels yield an empty list.
    pub async fn disease_by_label(&self, label: &str) -> BackendResult<Vec<DiseaseInfo>> {
        let url = self.endpoint(&format!(
            "/diseases/label/{}",
            urlencoding::encode(label)
        ));

        match self.send::<Vec<DiseaseInfo>>(self.http.get(url)).await {
            Ok(envelope) => Ok(envelope.into_optional()?.unwrap_or_default()),
            Err(BackendError::NotFound(_)) => {
                debug!("No disease registered for label {}", label);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Disease record for the most confident detection of a result.
    pub async fn disease_for_detection(
        &self,
        result: &DetectionResult,
    ) -> BackendResult<Option<DiseaseInfo>> {
        let Some(best) = result.best() else {
            debug!("Detection result has no detections");
            return Ok(None);
        };

        info!(
            "Looking up disease for label {} (confidence {:.2})",
            best.label, best.confidence
        );
        let disease = self.disease_by_label(&best.label).await?.into_iter().next();
        if disease.is_none() {
            info!("No disease information for label {}", best.label);
        }
        Ok(disease)
    }

    /// Plots the user can file reports against.
    pub async fn plot_options(&self) -> BackendResult<Vec<PlotOption>> {
        let request = self.http.get(self.endpoint("/plots/options"));
        Ok(self.send(request).await?.into_optional()?.unwrap_or_default())
    }

    /// Upload a JPEG image into a media directory.
    pub async fn upload_image(
        &self,
        image: Vec<u8>,
        name: &str,
        directory_id: i64,
    ) -> BackendResult<MediaUpload> {
        let size = image.len();
        let part = Part::bytes(image)
            .file_name(name.to_string())
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .part("file", part)
            .text("name", name.to_string())
            .text("directory_id", directory_id.to_string());

        let request = self
            .http
            .post(self.endpoint("/medias/upload/single"))
            .multipart(form);
        let response = self.authorize(request).await?.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::CREATED {
            return Err(error_for_status(status, &body));
        }

        let envelope: ApiEnvelope<MediaUpload> = serde_json::from_str(&body)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let media = envelope
            .data
            .ok_or_else(|| BackendError::InvalidResponse("upload returned no media".to_string()))?;

        info!("Uploaded {} ({} bytes) as media {}", name, size, media.id);
        Ok(media)
    }

    /// File a disease report.
    pub async fn create_disease_log(
        &self,
        request: &DiseaseLogRequest,
    ) -> BackendResult<DiseaseLogRecord> {
        let builder = self.http.post(self.endpoint("/diseases-log")).json(request);
        let record: DiseaseLogRecord = self.send(builder).await?.into_data()?;
        info!("Created disease log {}", record.id);
        Ok(record)
    }

    /// File a disease report, uploading `image` first.
    ///
    /// A failed upload does not block the report; it is filed without images.
    pub async fn create_disease_log_with_image(
        &self,
        mut request: DiseaseLogRequest,
        image: Option<ImageAttachment>,
    ) -> BackendResult<DiseaseLogRecord> {
        if let Some(image) = image {
            match self
                .upload_image(image.data, &image.file_name, DISEASE_MEDIA_DIRECTORY)
                .await
            {
                Ok(media) => request.image_ids.push(media.id),
                Err(e) => warn!("Image upload failed, filing report without it: {}", e),
            }
        }

        self.create_disease_log(&request).await
    }

    async fn authorize(&self, request: RequestBuilder) -> BackendResult<RequestBuilder> {
        Ok(match self.store.get(ACCESS_TOKEN_KEY).await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Send a request and decode the response envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> BackendResult<ApiEnvelope<T>> {
        let response = self.authorize(request).await?.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(error_for_status(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

/// Map an error status to an error, using the envelope's text when present.
fn error_for_status(status: StatusCode, body: &str) -> BackendError {
    let detail = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body)
        .map(|envelope| envelope.failure_text())
        .unwrap_or_else(|_| format!("{}: {}", status, body));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(detail),
        StatusCode::NOT_FOUND => BackendError::NotFound(detail),
        s if s.is_client_error() => BackendError::Rejected(detail),
        _ => BackendError::RequestFailed(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_for_status_uses_envelope_text() {
        let body = r#"{"success": false, "message": "Sai mật khẩu"}"#;
        match error_for_status(StatusCode::UNAUTHORIZED, body) {
            BackendError::Unauthorized(msg) => assert_eq!(msg, "Sai mật khẩu"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_for_status_plain_body() {
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, "upstream down"),
            BackendError::RequestFailed(msg) if msg.contains("upstream down")
        ));
        assert!(matches!(
            error_for_status(StatusCode::UNPROCESSABLE_ENTITY, ""),
            BackendError::Rejected(_)
        ));
    }
}
