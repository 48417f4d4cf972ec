//! Shared test helpers: an in-memory [`JobBackend`] and job configs.
#![allow(dead_code)]

pub mod server;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use capgen_client::backend::{
    FrameStream, JobBackend, RunRequest, StartResponse, StopAck, TransportError, UploadConfig,
};
use capgen_core::assemble::{assemble, JobForm, TemplateChoice};
use capgen_core::job::{InitiationPath, JobConfig, UploadedAsset};
use futures::StreamExt;
use tokio::sync::{mpsc, Notify};

type FrameSender = mpsc::UnboundedSender<Result<String, TransportError>>;

/// Decrements the open-stream count when the stream is dropped.
struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted backend. Start replies are consumed in order; once they run
/// out every start is accepted without a temp directory.
#[derive(Default)]
pub struct FakeBackend {
    start_replies: Mutex<VecDeque<Result<StartResponse, TransportError>>>,
    frames: Mutex<Option<FrameSender>>,
    open_streams: Arc<AtomicUsize>,
    max_concurrent: AtomicUsize,
    opened: AtomicUsize,
    stop_calls: AtomicUsize,
    cleanup_calls: Mutex<Vec<String>>,
    existing_requests: Mutex<Vec<RunRequest>>,
    upload_requests: Mutex<Vec<UploadConfig>>,
    pub fail_cleanup: AtomicBool,
    pub fail_stream_open: AtomicBool,
    pub fail_stop: AtomicBool,
    /// When set, each cleanup waits for [`FakeBackend::release_cleanup`].
    pub hold_cleanup: AtomicBool,
    cleanup_release: Notify,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply_with(&self, reply: Result<StartResponse, TransportError>) {
        self.start_replies.lock().unwrap().push_back(reply);
    }

    /// Queue a raw frame on the open stream. Returns false if none is open.
    pub fn push_frame(&self, frame: serde_json::Value) -> bool {
        self.send(Ok(frame.to_string()))
    }

    pub fn push_raw(&self, text: &str) -> bool {
        self.send(Ok(text.to_string()))
    }

    pub fn push_receive_error(&self) -> bool {
        self.send(Err(TransportError::Request("connection reset".into())))
    }

    /// End the open stream as if the server closed it.
    pub fn close_stream(&self) {
        self.frames.lock().unwrap().take();
    }

    pub fn release_cleanup(&self) {
        self.cleanup_release.notify_one();
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> Vec<String> {
        self.cleanup_calls.lock().unwrap().clone()
    }

    pub fn existing_requests(&self) -> Vec<RunRequest> {
        self.existing_requests.lock().unwrap().clone()
    }

    pub fn upload_requests(&self) -> Vec<UploadConfig> {
        self.upload_requests.lock().unwrap().clone()
    }

    fn send(&self, item: Result<String, TransportError>) -> bool {
        match self.frames.lock().unwrap().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    fn next_reply(&self) -> Result<StartResponse, TransportError> {
        self.start_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StartResponse::started()))
    }
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn start_existing(&self, request: &RunRequest) -> Result<StartResponse, TransportError> {
        self.existing_requests.lock().unwrap().push(request.clone());
        self.next_reply()
    }

    async fn start_upload(
        &self,
        _asset: &UploadedAsset,
        config: &UploadConfig,
    ) -> Result<StartResponse, TransportError> {
        self.upload_requests.lock().unwrap().push(config.clone());
        self.next_reply()
    }

    async fn open_progress_stream(&self) -> Result<FrameStream, TransportError> {
        if self.fail_stream_open.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 503,
                body: "stream unavailable".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.frames.lock().unwrap() = Some(tx);

        self.opened.fetch_add(1, Ordering::SeqCst);
        let now_open = self.open_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now_open, Ordering::SeqCst);
        let guard = OpenGuard(Arc::clone(&self.open_streams));

        let frames = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        })
        .boxed();
        Ok(frames)
    }

    async fn stop_job(&self) -> Result<StopAck, TransportError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(TransportError::Request("connection refused".into()));
        }
        Ok(StopAck {
            status: Some("stopped".into()),
        })
    }

    async fn cleanup(&self, temp_dir: &str) -> Result<(), TransportError> {
        if self.hold_cleanup.load(Ordering::SeqCst) {
            self.cleanup_release.notified().await;
        }
        self.cleanup_calls.lock().unwrap().push(temp_dir.to_string());
        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 500,
                body: "rmtree failed".into(),
            });
        }
        Ok(())
    }
}

pub const TEMPLATE: &str = "example_template.json";

/// A valid form for either path.
pub fn form() -> JobForm {
    JobForm {
        credential: "sk-test".into(),
        parent_dir: "/data/assets".into(),
        template: TemplateChoice::File(TEMPLATE.into()),
        asset: Some(UploadedAsset::new("chair.glb", vec![0x67, 0x6c, 0x54, 0x46])),
        ..JobForm::default()
    }
}

/// A valid existing-folder job.
pub fn existing_config() -> JobConfig {
    assemble(&form(), InitiationPath::Existing, &[TEMPLATE.to_string()]).unwrap()
}

/// A valid upload job.
pub fn upload_config() -> JobConfig {
    assemble(&form(), InitiationPath::Upload, &[TEMPLATE.to_string()]).unwrap()
}

pub fn output(line: &str) -> serde_json::Value {
    serde_json::json!({ "type": "output", "data": line })
}

pub fn complete() -> serde_json::Value {
    serde_json::json!({ "type": "complete", "code": 0 })
}

pub fn complete_with_bundle() -> serde_json::Value {
    serde_json::json!({
        "type": "complete",
        "data": {
            "images": [{ "name": "view_0.png", "data": "data:image/png;base64,AAAA" }],
            "output": { "caption": "a wooden chair" }
        }
    })
}

pub fn error(message: &str) -> serde_json::Value {
    serde_json::json!({ "type": "error", "data": message })
}
