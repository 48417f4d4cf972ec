//! Progress stream frame types and decoder.
//!
//! The backend sends JSON frames shaped `{"type": "<kind>", ...}` over
//! server-sent events. This module deserializes them into
//! [`ProgressFrame`] and reduces them to the [`StreamEvent`]s the job
//! runner consumes.

use capgen_core::job::ResultBundle;
use capgen_core::job_events::{
    FRAME_TYPE_COMPLETE, FRAME_TYPE_ERROR, FRAME_TYPE_OUTPUT, FRAME_TYPE_PING,
};
use serde::Deserialize;

/// Message used for every transport-level stream failure.
pub const TRANSPORT_LOST_MESSAGE: &str = "Connection to progress stream lost";

/// All known progress frame types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressFrame {
    /// One line of job output.
    Output { data: String },

    /// The job finished.
    ///
    /// `data` holds the inline result bundle for uploads. `code` is the
    /// batch process exit status when the backend reports it.
    Complete {
        #[serde(default)]
        data: Option<serde_json::Value>,
        #[serde(default)]
        code: Option<i32>,
    },

    /// The job failed.
    Error { data: String },

    /// Keep-alive.
    Ping,
}

impl ProgressFrame {
    /// The wire `type` value of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Output { .. } => FRAME_TYPE_OUTPUT,
            Self::Complete { .. } => FRAME_TYPE_COMPLETE,
            Self::Error { .. } => FRAME_TYPE_ERROR,
            Self::Ping => FRAME_TYPE_PING,
        }
    }
}

/// Who reported a stream error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// The job itself, through an `error` frame.
    Application,
    /// The connection carrying the stream.
    Transport,
}

/// A decoded progress event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Output(String),
    Complete {
        result: Option<ResultBundle>,
        exit_code: Option<i32>,
    },
    Error {
        message: String,
        origin: ErrorOrigin,
    },
}

impl StreamEvent {
    pub fn application_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            origin: ErrorOrigin::Application,
        }
    }

    pub fn transport_lost() -> Self {
        Self::Error {
            message: TRANSPORT_LOST_MESSAGE.to_string(),
            origin: ErrorOrigin::Transport,
        }
    }
}

/// Parse one frame payload into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
pub fn parse_frame(text: &str) -> Result<ProgressFrame, serde_json::Error> {
    serde_json::from_str(text)
}

/// Decode a frame payload into an event.
///
/// Keep-alives, unknown types and malformed frames yield `None`: the
/// stream carries heartbeat noise that must never reach the job.
pub fn decode_frame(text: &str) -> Option<StreamEvent> {
    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, raw_frame = %text, "Dropping unparseable progress frame");
            return None;
        }
    };
    tracing::trace!(kind = frame.kind(), "Progress frame received");

    match frame {
        ProgressFrame::Output { data } => Some(StreamEvent::Output(data)),
        ProgressFrame::Complete { data, code } => Some(StreamEvent::Complete {
            result: data.and_then(into_bundle),
            exit_code: code,
        }),
        ProgressFrame::Error { data } => Some(StreamEvent::application_error(data)),
        ProgressFrame::Ping => {
            tracing::debug!("Dropping keep-alive frame");
            None
        }
    }
}

fn into_bundle(data: serde_json::Value) -> Option<ResultBundle> {
    if data.is_null() {
        return None;
    }
    match serde_json::from_value(data) {
        Ok(bundle) => Some(bundle),
        Err(e) => {
            tracing::warn!(error = %e, "Completion payload is not a result bundle, ignoring it");
            None
        }
    }
}
