//! The backend seam and its wire types.
//!
//! [`JobBackend`] lists every collaborator call the job client makes.
//! [`HttpBackend`](crate::api::HttpBackend) is the real implementation;
//! tests substitute an in-memory one.

use async_trait::async_trait;
use capgen_core::job::{JobConfig, TemplateSource, UploadedAsset};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Raw `data:` payloads of the progress stream, in arrival order.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Network or protocol failure talking to the backend.
///
/// Carries a description only; the server gave no application-level
/// reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (connect, DNS, TLS, reset).
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The backend answered with a non-2xx status and no usable body.
    #[error("Backend error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Reply to either start operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Temp directory holding the uploaded asset (upload path only).
    #[serde(default)]
    pub temp_dir: Option<String>,
}

impl StartResponse {
    pub const STARTED: &'static str = "started";

    pub fn started() -> Self {
        Self {
            status: Some(Self::STARTED.to_string()),
            ..Self::default()
        }
    }

    pub fn started_upload(temp_dir: impl Into<String>) -> Self {
        Self {
            temp_dir: Some(temp_dir.into()),
            ..Self::started()
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            status: Some("error".to_string()),
            error: Some(error.into()),
            temp_dir: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.status.as_deref() == Some(Self::STARTED)
    }
}

/// Reply to `POST /api/stop`. Nothing in it is guaranteed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopAck {
    #[serde(default)]
    pub status: Option<String>,
}

/// Template fields shared by both start payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateFields {
    pub use_inline_template: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_template: Option<serde_json::Value>,
}

impl From<&TemplateSource> for TemplateFields {
    fn from(source: &TemplateSource) -> Self {
        match source {
            TemplateSource::Inline(value) => Self {
                use_inline_template: true,
                template_file: None,
                inline_template: Some(value.clone()),
            },
            TemplateSource::Named(name) => Self {
                use_inline_template: false,
                template_file: Some(name.clone()),
                inline_template: None,
            },
        }
    }
}

/// JSON body of `POST /api/run` (existing-folder path).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRequest {
    pub api_key: String,
    pub parent_dir: String,
    pub model: String,
    pub num_views: u32,
    pub max_tokens: u32,
    pub rate_limit_delay: f64,
    pub use_diffurank: bool,
    pub overwrite: bool,
    #[serde(flatten)]
    pub template: TemplateFields,
}

impl RunRequest {
    pub fn new(config: &JobConfig, parent_dir: &str) -> Self {
        Self {
            api_key: config.credential.expose().to_string(),
            parent_dir: parent_dir.to_string(),
            model: config.model_id.clone(),
            num_views: config.view_count,
            max_tokens: config.max_tokens,
            rate_limit_delay: config.rate_limit_delay_seconds,
            use_diffurank: config.use_ranking_heuristic,
            overwrite: config.overwrite_existing,
            template: TemplateFields::from(&config.template),
        }
    }
}

/// The `config` part of `POST /api/upload`.
///
/// Has no `overwrite` field: an upload always lands in a fresh temp
/// directory, and the backend ignores the flag on this path. The
/// asymmetry with [`RunRequest`] is kept on purpose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadConfig {
    pub api_key: String,
    pub model: String,
    pub num_views: u32,
    pub max_tokens: u32,
    pub rate_limit_delay: f64,
    pub use_diffurank: bool,
    #[serde(flatten)]
    pub template: TemplateFields,
}

impl From<&JobConfig> for UploadConfig {
    fn from(config: &JobConfig) -> Self {
        Self {
            api_key: config.credential.expose().to_string(),
            model: config.model_id.clone(),
            num_views: config.view_count,
            max_tokens: config.max_tokens,
            rate_limit_delay: config.rate_limit_delay_seconds,
            use_diffurank: config.use_ranking_heuristic,
            template: TemplateFields::from(&config.template),
        }
    }
}

/// Every backend call the job client depends on.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Start processing an existing folder tree.
    async fn start_existing(&self, request: &RunRequest) -> Result<StartResponse, TransportError>;

    /// Upload an asset and start processing it.
    async fn start_upload(
        &self,
        asset: &UploadedAsset,
        config: &UploadConfig,
    ) -> Result<StartResponse, TransportError>;

    /// Open the server-sent progress stream.
    async fn open_progress_stream(&self) -> Result<FrameStream, TransportError>;

    /// Ask the backend to stop the running job.
    async fn stop_job(&self) -> Result<StopAck, TransportError>;

    /// Delete a temp directory created by an upload.
    async fn cleanup(&self, temp_dir: &str) -> Result<(), TransportError>;
}
