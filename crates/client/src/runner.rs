//! Job state machine.
//!
//! [`JobRunner`] is the hub of the client. It starts a job through the
//! [`JobLauncher`], attaches the [`ProgressStreamClient`], folds stream
//! events into a [`JobState`] one at a time in arrival order, and on the
//! way out detaches the stream, schedules upload cleanup and signals the
//! front end to re-enable its start control.
//!
//! State changes and transcript lines are broadcast as [`JobNotice`]s.
//! Call [`JobRunner::subscribe`] to receive them.
//!
//! ```text
//! Idle --start--> Starting --accepted--> Running --Complete--> Completed
//!                     |                     |------Error-----> Failed
//!                     '--rejected--> Failed '------cancel----> Cancelled
//! ```

use std::sync::Arc;

use capgen_core::job::{JobConfig, JobHandle, JobPath, JobState, ResultBundle};
use capgen_core::transcript::{LineClass, TranscriptLine};
use capgen_core::types::JobId;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::backend::JobBackend;
use crate::cleanup::CleanupAgent;
use crate::error::{JobError, StartRejected};
use crate::events::JobNotice;
use crate::launcher::JobLauncher;
use crate::messages::{ErrorOrigin, StreamEvent};
use crate::stream::ProgressStreamClient;

/// Broadcast channel capacity for runner notices.
const NOTICE_CHANNEL_CAPACITY: usize = 256;

/// Drives one job at a time from start to a terminal state.
///
/// Owns the only progress stream and the only job state; both change
/// through `&mut self` alone.
pub struct JobRunner {
    backend: Arc<dyn JobBackend>,
    launcher: JobLauncher,
    stream: ProgressStreamClient,
    cleanup: CleanupAgent,
    state: JobState,
    /// Present from acceptance until the job ends.
    job: Option<JobHandle>,
    /// Id of the current or most recent job, kept after the handle goes.
    job_id: Option<JobId>,
    transcript: Vec<TranscriptLine>,
    result: Option<ResultBundle>,
    failure: Option<JobError>,
    notice_tx: broadcast::Sender<JobNotice>,
}

impl JobRunner {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            launcher: JobLauncher::new(Arc::clone(&backend)),
            stream: ProgressStreamClient::new(Arc::clone(&backend)),
            cleanup: CleanupAgent::new(Arc::clone(&backend)),
            backend,
            state: JobState::Idle,
            job: None,
            job_id: None,
            transcript: Vec::new(),
            result: None,
            failure: None,
            notice_tx,
        }
    }

    /// Subscribe to transcript lines and state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<JobNotice> {
        self.notice_tx.subscribe()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn transcript(&self) -> &[TranscriptLine] {
        &self.transcript
    }

    /// Inline artifacts of a completed upload job.
    pub fn result(&self) -> Option<&ResultBundle> {
        self.result.as_ref()
    }

    /// Why the last job failed, if it did.
    pub fn failure(&self) -> Option<&JobError> {
        self.failure.as_ref()
    }

    /// The accepted job, while it is running.
    pub fn current_job(&self) -> Option<&JobHandle> {
        self.job.as_ref()
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    pub fn is_stream_attached(&self) -> bool {
        self.stream.is_attached()
    }

    /// Number of temp-resource cleanups still in flight.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanup.pending()
    }

    /// Wait for scheduled temp-resource cleanups to finish.
    pub async fn wait_for_cleanup(&self) {
        self.cleanup.wait_idle().await;
    }

    /// Start a new job.
    ///
    /// Refused while another job is starting or running. From `Idle` or
    /// any terminal state a fresh job begins, and the call returns once
    /// it is either `Running` or `Failed`.
    pub async fn start(&mut self, config: &JobConfig) -> Result<JobState, StartRejected> {
        if self.state.is_active() {
            tracing::warn!(state = %self.state, "Start requested while a job is active");
            self.notify(JobNotice::StartRejected {
                reason: StartRejected::JobActive.to_string(),
            });
            return Err(StartRejected::JobActive);
        }

        self.job = None;
        self.job_id = None;
        self.transcript.clear();
        self.result = None;
        self.failure = None;

        self.set_state(JobState::Starting);
        self.push_line(TranscriptLine::with_class("Starting job...", LineClass::Neutral));

        let handle = match self.launcher.start(config).await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(JobError::from(e));
                return Ok(self.state);
            }
        };
        self.job_id = Some(handle.id);
        self.job = Some(handle);

        match self.stream.attach().await {
            Ok(stream_id) => {
                tracing::info!(job_id = ?self.job_id, stream_id = %stream_id, "Job running");
                self.set_state(JobState::Running);
            }
            Err(e) => self.fail(JobError::Transport(e.to_string())),
        }

        Ok(self.state)
    }

    /// Read the next event from the attached stream, without applying it.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.stream.next_event().await
    }

    /// Apply one stream event.
    ///
    /// Events arriving outside `Running` (late frames after a cancel, a
    /// second terminal frame) are discarded.
    pub fn handle_event(&mut self, event: StreamEvent) {
        if self.state != JobState::Running {
            tracing::debug!(state = %self.state, ?event, "Discarding progress event");
            return;
        }

        match event {
            StreamEvent::Output(text) => {
                self.push_line(TranscriptLine::classified(text));
            }
            StreamEvent::Complete { result, exit_code } => {
                tracing::info!(
                    job_id = ?self.job_id,
                    exit_code = ?exit_code,
                    has_result = result.is_some(),
                    "Job completed",
                );
                self.push_line(TranscriptLine::with_class(
                    "✓ Job completed!",
                    LineClass::Success,
                ));
                self.result = match (&self.job, result) {
                    (Some(JobHandle { path: JobPath::Upload { .. }, .. }), result) => result,
                    (_, Some(_)) => {
                        tracing::warn!("Ignoring result bundle sent for an existing-folder job");
                        None
                    }
                    (_, None) => None,
                };
                self.finish(JobState::Completed);
            }
            StreamEvent::Error { message, origin } => {
                let failure = match origin {
                    ErrorOrigin::Application => JobError::Application(message),
                    ErrorOrigin::Transport => JobError::Transport(message),
                };
                self.fail(failure);
            }
        }
    }

    /// Stop listening and ask the backend to stop the job.
    ///
    /// Does not wait for a final frame. The stop request is best-effort:
    /// its failure is logged and the job is cancelled regardless. A
    /// no-op unless a job is running.
    pub async fn cancel(&mut self) -> JobState {
        if self.state != JobState::Running {
            tracing::debug!(state = %self.state, "Cancel ignored, no running job");
            return self.state;
        }

        match self.backend.stop_job().await {
            Ok(ack) => tracing::info!(job_id = ?self.job_id, status = ?ack.status, "Stop requested"),
            Err(e) => tracing::warn!(job_id = ?self.job_id, error = %e, "Stop request failed"),
        }

        self.push_line(TranscriptLine::with_class(
            "⬛ Job stopped by user",
            LineClass::Error,
        ));
        self.finish(JobState::Cancelled);
        self.state
    }

    /// Pump stream events until the job reaches a terminal state.
    ///
    /// Cancelling `cancel` cancels the job; when a cancel and an event
    /// are both ready, the cancel wins.
    pub async fn drive(&mut self, cancel: &CancellationToken) -> JobState {
        while self.state == JobState::Running {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = self.stream.next_event() => {
                    Some(event.unwrap_or_else(StreamEvent::transport_lost))
                }
            };

            match next {
                Some(event) => self.handle_event(event),
                None => {
                    self.cancel().await;
                }
            }
        }
        self.state
    }

    // ---- private helpers ----

    fn fail(&mut self, failure: JobError) {
        tracing::error!(job_id = ?self.job_id, error = %failure, "Job failed");
        self.push_line(TranscriptLine::with_class(
            format!("✗ Error: {failure}"),
            LineClass::Error,
        ));
        self.failure = Some(failure);
        self.finish(JobState::Failed);
    }

    /// Enter a terminal state. Runs its side effects once per job.
    fn finish(&mut self, state: JobState) {
        if self.state.is_terminal() {
            return;
        }

        self.stream.detach();
        self.set_state(state);

        if let Some(handle) = self.job.take() {
            let run_ms = (chrono::Utc::now() - handle.accepted_at).num_milliseconds();
            tracing::info!(job_id = %handle.id, state = %state, run_ms, "Job finished");
            if let Some(temp_dir) = handle.temp_resource_id() {
                self.cleanup.cleanup(temp_dir.to_string());
            }
        }

        self.notify(JobNotice::ControlsReset {
            job_id: self.job_id,
        });
    }

    fn set_state(&mut self, state: JobState) {
        tracing::debug!(job_id = ?self.job_id, from = %self.state, to = %state, "Job state change");
        self.state = state;
        self.notify(JobNotice::StateChanged {
            job_id: self.job_id,
            state,
        });
    }

    fn push_line(&mut self, line: TranscriptLine) {
        self.transcript.push(line.clone());
        self.notify(JobNotice::Line { line });
    }

    fn notify(&self, notice: JobNotice) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.notice_tx.send(notice);
    }
}
