use capgen_core::error::ValidationError;

use crate::launcher::LaunchError;

/// Every way a job can fail to run to completion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    /// Bad form input; no request was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend declined to start the job.
    #[error("Job rejected: {0}")]
    LaunchRejected(String),

    /// Network or stream failure. No server-side reason is known.
    #[error("{0}")]
    Transport(String),

    /// The job reported its own failure.
    #[error("{0}")]
    Application(String),
}

impl From<LaunchError> for JobError {
    fn from(e: LaunchError) -> Self {
        match e {
            LaunchError::Rejected(reason) => Self::LaunchRejected(reason),
            LaunchError::Transport(e) => Self::Transport(e.to_string()),
        }
    }
}

/// A start request that was refused without touching the current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StartRejected {
    #[error("A job is already running")]
    JobActive,
}
