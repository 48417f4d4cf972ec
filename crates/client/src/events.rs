//! Notices broadcast by the job runner.
//!
//! These are what a front end renders: transcript lines as they arrive,
//! state changes, rejected start attempts, and the signal to re-enable
//! the start control.

use capgen_core::job::JobState;
use capgen_core::transcript::TranscriptLine;
use capgen_core::types::JobId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobNotice {
    /// A line was appended to the transcript.
    Line { line: TranscriptLine },

    /// The runner moved to a new state.
    StateChanged {
        job_id: Option<JobId>,
        state: JobState,
    },

    /// A start request was refused because a job is already active.
    StartRejected { reason: String },

    /// The job ended; the start control may be re-enabled.
    /// Sent exactly once per job.
    ControlsReset { job_id: Option<JobId> },
}
