//! HTTP client for the hospital information system REST API.
//!
//! Every endpoint answers with the `{status, message?, data}` envelope.
//! A non-2xx status or a `status` other than `"success"` is an error whose
//! message, when present, is surfaced to the user as-is.

pub mod imaging;

pub use imaging::{
    HttpStudyUploader, ProgressSink, StudyUploadReceipt, StudyUploadRequest, StudyUploader,
};

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppResult, UploadError};
use crate::models::{ApiEnvelope, ApiResponse};

/// Authenticated client shared by every API call.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<SecretString>,
    http: reqwest::Client,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ApiClient {
    /// Create a client from configuration.
    pub fn new(config: &Config) -> AppResult<Self> {
        Self::with_base_url(
            &config.api_base_url,
            config.api_token.clone(),
            config.connect_timeout(),
        )
    }

    /// Create a client for an explicit base URL.
    ///
    /// Only the connect phase is bounded: study payloads can be large and the
    /// server enforces its own limits.
    pub fn with_base_url(
        base_url: &str,
        token: Option<SecretString>,
        connect_timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("dicom-study-uploader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.post(self.url(path)))
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// GET a path and unwrap its envelope.
    pub async fn get_envelope<T: DeserializeOwned>(&self, path: &str) -> AppResult<ApiResponse<T>> {
        debug!("GET {}", self.url(path));
        let response = self.get(path).send().await?;
        Self::read_envelope(response).await
    }

    /// Unwrap an envelope, mapping failures to [`UploadError`].
    pub async fn read_envelope<T: DeserializeOwned>(response: Response) -> AppResult<ApiResponse<T>> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.message);
            warn!(
                status = %status.as_u16(),
                message = message.as_deref().unwrap_or(""),
                "API request failed"
            );
            return Err(UploadError::from_status(status.as_u16(), message));
        }

        let envelope: ApiEnvelope<T> = serde_json::from_slice(&body)?;
        if !envelope.is_success() {
            warn!(
                status = %envelope.status,
                message = envelope.message.as_deref().unwrap_or(""),
                "API reported failure"
            );
            return Err(UploadError::Server {
                status: Some(status.as_u16()),
                message: envelope.message,
            });
        }

        let data = envelope.data.ok_or_else(|| {
            UploadError::UnexpectedResponse("success response without data".to_string())
        })?;

        Ok(ApiResponse {
            message: envelope.message,
            data,
        })
    }
}
