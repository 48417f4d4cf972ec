//! Progress stream client.
//!
//! [`ProgressStreamClient`] owns at most one open progress stream. Call
//! [`attach`](ProgressStreamClient::attach) to open it,
//! [`next_event`](ProgressStreamClient::next_event) to read decoded
//! events, and [`detach`](ProgressStreamClient::detach) to release it.
//! Attaching again replaces the previous stream; it never multiplexes.

use std::fmt;
use std::sync::Arc;

use capgen_core::types::Timestamp;
use futures::StreamExt;

use crate::backend::{FrameStream, JobBackend, TransportError};
use crate::messages::{decode_frame, StreamEvent};

/// Identifies one attachment, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// A live progress stream. Dropping it closes the connection.
struct StreamHandle {
    id: StreamId,
    frames: FrameStream,
    opened_at: Timestamp,
}

/// Owner of the single progress stream connection.
pub struct ProgressStreamClient {
    backend: Arc<dyn JobBackend>,
    current: Option<StreamHandle>,
    next_id: u64,
}

impl ProgressStreamClient {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self {
            backend,
            current: None,
            next_id: 1,
        }
    }

    /// Open a new progress stream, closing any stream already open.
    pub async fn attach(&mut self) -> Result<StreamId, TransportError> {
        if self.detach() {
            tracing::debug!("Replaced previous progress stream");
        }

        let frames = self.backend.open_progress_stream().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to open progress stream");
            e
        })?;

        let id = StreamId(self.next_id);
        self.next_id += 1;
        self.current = Some(StreamHandle {
            id,
            frames,
            opened_at: chrono::Utc::now(),
        });

        tracing::info!(stream_id = %id, "Attached to progress stream");
        Ok(id)
    }

    /// Close the open stream, if any. Returns whether one was closed.
    ///
    /// Safe to call any number of times.
    pub fn detach(&mut self) -> bool {
        match self.current.take() {
            Some(handle) => {
                let open_ms = (chrono::Utc::now() - handle.opened_at).num_milliseconds();
                tracing::info!(stream_id = %handle.id, open_ms, "Detached from progress stream");
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_id(&self) -> Option<StreamId> {
        self.current.as_ref().map(|handle| handle.id)
    }

    /// Wait for the next event on the open stream.
    ///
    /// Noise frames are skipped. A receive error, or the server closing
    /// the stream, yields a transport [`StreamEvent::Error`]. Returns
    /// `None` only when nothing is attached.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let handle = self.current.as_mut()?;

        loop {
            match handle.frames.next().await {
                Some(Ok(text)) => {
                    if let Some(event) = decode_frame(&text) {
                        return Some(event);
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(stream_id = %handle.id, error = %e, "Progress stream receive error");
                    return Some(StreamEvent::transport_lost());
                }
                None => {
                    tracing::warn!(stream_id = %handle.id, "Progress stream closed by server");
                    return Some(StreamEvent::transport_lost());
                }
            }
        }
    }
}

impl Drop for ProgressStreamClient {
    fn drop(&mut self) {
        self.detach();
    }
}
