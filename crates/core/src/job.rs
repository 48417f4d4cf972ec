//! Job configuration, handles, states and results.
//!
//! The two ways of starting a job (process an existing folder tree, or
//! upload a new asset) are a single tagged variant here so the rest of
//! the client has one code path with one branch point.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ImageEntry;
use crate::types::{JobId, Timestamp};

/// API key for the model provider.
///
/// `Debug` is redacted so configs can be logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Where the caption template comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    /// Template JSON pasted by the user, already parsed.
    Inline(serde_json::Value),
    /// A template file previously listed by the backend.
    Named(String),
}

/// A file picked for upload. The client never looks inside it.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedAsset {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: "application/octet-stream".to_string(),
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

impl fmt::Debug for UploadedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedAsset")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Which initiation path a job uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiationPath {
    Existing,
    Upload,
}

/// What the job runs over. Exactly one of these exists per config.
#[derive(Debug, Clone, PartialEq)]
pub enum JobSource {
    /// Process every folder under an existing parent directory.
    Existing { source_path: String },
    /// Upload one asset into a server-side temp directory and process it.
    Upload { asset: UploadedAsset },
}

/// A validated job configuration. Build one with
/// [`assemble`](crate::assemble::assemble).
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub credential: Credential,
    pub model_id: String,
    pub view_count: u32,
    pub max_tokens: u32,
    pub rate_limit_delay_seconds: f64,
    pub use_ranking_heuristic: bool,
    pub overwrite_existing: bool,
    pub template: TemplateSource,
    pub source: JobSource,
}

impl JobConfig {
    pub fn path(&self) -> InitiationPath {
        match self.source {
            JobSource::Existing { .. } => InitiationPath::Existing,
            JobSource::Upload { .. } => InitiationPath::Upload,
        }
    }
}

/// Path variant of an accepted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPath {
    Existing,
    /// The backend created a temp directory that must be cleaned up.
    Upload { temp_resource_id: String },
}

/// An accepted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
    pub path: JobPath,
    pub accepted_at: Timestamp,
}

impl JobHandle {
    pub fn existing() -> Self {
        Self::with_path(JobPath::Existing)
    }

    pub fn upload(temp_resource_id: impl Into<String>) -> Self {
        Self::with_path(JobPath::Upload {
            temp_resource_id: temp_resource_id.into(),
        })
    }

    fn with_path(path: JobPath) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            path,
            accepted_at: chrono::Utc::now(),
        }
    }

    /// The temp resource to clean up, if this job owns one.
    pub fn temp_resource_id(&self) -> Option<&str> {
        match &self.path {
            JobPath::Upload { temp_resource_id } => Some(temp_resource_id),
            JobPath::Existing => None,
        }
    }
}

/// Lifecycle of the current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// `Completed`, `Failed` and `Cancelled` end a job instance.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// A job is in flight; a second one may not start.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Inline artifacts delivered with the completion of an upload job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(alias = "output", default)]
    pub structured_output: serde_json::Value,
}
