//! REST client for the batch processing service.
//!
//! [`BatchTransport`] is the seam the orchestrator, poller and health probe
//! talk to; [`ApiClient`] implements it over HTTP using [`reqwest`]. Each
//! operation is a single request/response with no retry and no state.

use async_trait::async_trait;
use batchvision_core::error::BatchError;
use batchvision_core::job::InputFile;
use batchvision_core::options::ProcessOptions;
use batchvision_core::types::SessionId;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::ClientConfig;

/// Multipart field name used for every uploaded image.
pub const FILES_FIELD: &str = "files";

/// Status reported by `GET /status/{session_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Done,
    Error,
    /// Still processing. Unrecognised status strings also land here.
    #[serde(other)]
    Pending,
}

/// Raw body of `GET /results/{session_id}`, before normalization.
///
/// Fields are kept loosely typed so that shape problems surface as
/// [`BatchError::MalformedResult`] from the normalizer rather than as
/// decode failures here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResults {
    #[serde(default)]
    pub results: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
    #[serde(default)]
    pub thread_count: Option<serde_json::Value>,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Free-form `status` field, when the service sends one.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: RemoteStatus,
}

#[derive(Debug, Default, Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: Option<String>,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Service error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body did not match the expected JSON shape.
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request was rejected before being sent.
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<ApiError> for BatchError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Request(e) => BatchError::Transport {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            ApiError::Status { status, body } => BatchError::Transport {
                status: Some(status),
                message: body,
            },
            ApiError::Decode(e) => BatchError::MalformedResult(e.to_string()),
            ApiError::Validation(msg) => BatchError::Validation(msg),
        }
    }
}

/// The three job operations plus the liveness check.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Upload the files with their options. Returns the session id.
    ///
    /// Fails with [`ApiError::Validation`] for an empty file set, before
    /// any network call.
    async fn submit_batch(
        &self,
        files: &[InputFile],
        options: &ProcessOptions,
    ) -> Result<SessionId, ApiError>;

    /// Current processing status of a session. An `error` status is a
    /// successful call.
    async fn get_status(&self, session_id: &str) -> Result<RemoteStatus, ApiError>;

    /// Raw results of a session whose status is `done`.
    async fn get_results(&self, session_id: &str) -> Result<RawResults, ApiError>;

    /// Liveness check against the health endpoint.
    async fn health(&self) -> Result<HealthReport, ApiError>;

    /// Base location that relative result paths are resolved against.
    fn base_url(&self) -> &str;
}

/// HTTP client for one processing service.
pub struct ApiClient {
    client: reqwest::Client,
    api_url: String,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Build a client from configuration, applying the optional
    /// per-request timeout.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, config.api_url.clone()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or [`ApiError::Status`] containing
    /// the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl BatchTransport for ApiClient {
    /// Sends a `POST /upload` multipart request with one `files` part per
    /// image followed by the option fields.
    async fn submit_batch(
        &self,
        files: &[InputFile],
        options: &ProcessOptions,
    ) -> Result<SessionId, ApiError> {
        if files.is_empty() {
            return Err(ApiError::Validation(
                "at least one image is required".to_string(),
            ));
        }

        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes.to_vec())
                .file_name(file.name.clone())
                .mime_str(guess_mime(&file.name))?;
            form = form.part(FILES_FIELD, part);
        }
        for (field, value) in options.form_fields() {
            form = form.text(field, value);
        }

        let response = self
            .client
            .post(self.endpoint("/upload"))
            .multipart(form)
            .send()
            .await?;

        let body: SubmitResponse = Self::parse_response(response).await?;
        tracing::debug!(session_id = %body.session_id, files = files.len(), "Batch uploaded");
        Ok(body.session_id)
    }

    async fn get_status(&self, session_id: &str) -> Result<RemoteStatus, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/status/{session_id}")))
            .send()
            .await?;

        let body: StatusResponse = Self::parse_response(response).await?;
        Ok(body.status)
    }

    async fn get_results(&self, session_id: &str) -> Result<RawResults, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/results/{session_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Any 2xx counts as healthy. The body is optional.
    async fn health(&self) -> Result<HealthReport, ApiError> {
        let response = self.client.get(self.endpoint("/api/health")).send().await?;
        let response = Self::ensure_success(response).await?;
        let text = response.text().await.unwrap_or_default();
        let body: HealthBody = serde_json::from_str(&text).unwrap_or_default();
        Ok(HealthReport {
            status: body.status,
        })
    }

    fn base_url(&self) -> &str {
        &self.api_url
    }
}

/// Content type for an upload part, from the file extension.
fn guess_mime(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
