//! Progress stream frame type constants.
//!
//! The backend tags every server-sent event with one of these values in
//! its `"type"` field.

/// A line of process output.
pub const FRAME_TYPE_OUTPUT: &str = "output";

/// The job finished. May carry an inline result bundle.
pub const FRAME_TYPE_COMPLETE: &str = "complete";

/// The job failed with a message.
pub const FRAME_TYPE_ERROR: &str = "error";

/// Keep-alive sent while the job is quiet. Carries nothing.
pub const FRAME_TYPE_PING: &str = "ping";
