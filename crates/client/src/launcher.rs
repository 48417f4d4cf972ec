//! Job launcher.
//!
//! Picks the start operation matching the config's initiation path and
//! turns the backend's reply into a [`JobHandle`]. Stateless and never
//! retries.

use std::sync::Arc;

use capgen_core::job::{JobConfig, JobHandle, JobSource};

use crate::backend::{JobBackend, RunRequest, StartResponse, TransportError, UploadConfig};

/// Outcome of a start attempt.
pub type LaunchResult = Result<JobHandle, LaunchError>;

/// Why a job did not start.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LaunchError {
    /// The backend declined the job.
    #[error("Job rejected: {0}")]
    Rejected(String),

    /// The start request never got a usable reply.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct JobLauncher {
    backend: Arc<dyn JobBackend>,
}

impl JobLauncher {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self { backend }
    }

    /// Submit `config` through the start operation for its path.
    pub async fn start(&self, config: &JobConfig) -> LaunchResult {
        match &config.source {
            JobSource::Existing { source_path } => {
                let request = RunRequest::new(config, source_path);
                let response = self.backend.start_existing(&request).await?;
                accepted(&response)?;

                let handle = JobHandle::existing();
                tracing::info!(
                    job_id = %handle.id,
                    parent_dir = %source_path,
                    model = %config.model_id,
                    "Existing-folder job accepted",
                );
                Ok(handle)
            }
            JobSource::Upload { asset } => {
                let payload = UploadConfig::from(config);
                let response = self.backend.start_upload(asset, &payload).await?;
                accepted(&response)?;

                let temp_dir = response.temp_dir.ok_or_else(|| {
                    LaunchError::Rejected("backend accepted the upload without a temp_dir".into())
                })?;
                let handle = JobHandle::upload(temp_dir);
                tracing::info!(
                    job_id = %handle.id,
                    file_name = %asset.file_name,
                    size_bytes = asset.bytes.len(),
                    temp_dir = handle.temp_resource_id().unwrap_or_default(),
                    "Upload job accepted",
                );
                Ok(handle)
            }
        }
    }
}

fn accepted(response: &StartResponse) -> Result<(), LaunchError> {
    if response.is_started() {
        return Ok(());
    }
    let reason = response
        .error
        .clone()
        .unwrap_or_else(|| "Unknown error".to_string());
    tracing::warn!(status = ?response.status, reason = %reason, "Job start rejected");
    Err(LaunchError::Rejected(reason))
}
