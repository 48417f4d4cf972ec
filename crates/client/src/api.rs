//! HTTP client for the capgen backend.
//!
//! [`HttpBackend`] implements [`JobBackend`] over the backend's REST and
//! server-sent-event endpoints using [`reqwest`], and also wraps the
//! read-only browsing endpoints (templates, folders, images, output).

use std::time::Duration;

use async_trait::async_trait;
use capgen_core::assemble::{self, JobForm};
use capgen_core::catalog::{FolderEntry, ImageEntry};
use capgen_core::job::{InitiationPath, JobConfig, UploadedAsset};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};

use crate::backend::{
    FrameStream, JobBackend, RunRequest, StartResponse, StopAck, TransportError, UploadConfig,
};
use crate::error::JobError;
use crate::sse::SseDecoder;

/// HTTP client for one backend instance.
pub struct HttpBackend {
    client: reqwest::Client,
    api_url: String,
    /// Per-request timeout for REST calls. Never applied to the stream.
    request_timeout: Duration,
}

impl HttpBackend {
    /// Create a client for the backend at `api_url`, e.g.
    /// `http://127.0.0.1:5000`.
    pub fn new(api_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, request_timeout)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// List template files the backend can use by name.
    pub async fn list_templates(&self) -> Result<Vec<String>, TransportError> {
        let response = self.get("/api/templates").send().await?;
        Self::parse_response(response).await
    }

    /// Fetch the content of one template file.
    pub async fn get_template(&self, filename: &str) -> Result<serde_json::Value, TransportError> {
        let url = self.segment_url("/api/template", filename)?;
        let response = self.client.get(url).timeout(self.request_timeout).send().await?;
        Self::parse_response(response).await
    }

    /// List asset folders under `<parent_dir>/Cap3D_imgs/`.
    pub async fn list_folders(&self, parent_dir: &str) -> Result<Vec<FolderEntry>, TransportError> {
        let response = self
            .post("/api/folders")
            .json(&serde_json::json!({ "parent_dir": parent_dir }))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Fetch up to ten rendered views of a folder as data URIs.
    pub async fn list_images(&self, folder_path: &str) -> Result<Vec<ImageEntry>, TransportError> {
        let url = self.segment_url("/api/images", folder_path)?;
        let response = self.client.get(url).timeout(self.request_timeout).send().await?;
        Self::parse_response(response).await
    }

    /// Fetch `structured_output.json` of a processed folder.
    pub async fn get_output(&self, folder_path: &str) -> Result<serde_json::Value, TransportError> {
        let url = self.segment_url("/api/output", folder_path)?;
        let response = self.client.get(url).timeout(self.request_timeout).send().await?;
        Self::parse_response(response).await
    }

    /// Validate `form` and build its [`JobConfig`].
    ///
    /// The template listing is fetched only when a named template is
    /// selected, and only after the checks that do not need it have
    /// passed, so a form without a credential never reaches the network.
    pub async fn assemble_job(
        &self,
        form: &JobForm,
        path: InitiationPath,
    ) -> Result<JobConfig, JobError> {
        assemble::check_selection(form)?;

        let known_templates = if assemble::needs_template_listing(form) {
            self.list_templates()
                .await
                .map_err(|e| JobError::Transport(e.to_string()))?
        } else {
            Vec::new()
        };

        Ok(assemble::assemble(form, path, &known_templates)?)
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// `prefix` followed by `value` as one percent-encoded segment, `/`
    /// included. Folder paths are absolute filesystem paths and must
    /// reach the server intact.
    fn segment_url(&self, prefix: &str, value: &str) -> Result<reqwest::Url, TransportError> {
        let mut url = reqwest::Url::parse(&self.url(prefix))
            .map_err(|e| TransportError::Request(format!("invalid backend URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::Request(format!("{} cannot be a base URL", self.api_url)))?
            .push(value);
        Ok(url)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).timeout(self.request_timeout)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).timeout(self.request_timeout)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`TransportError::Status`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Read a start reply.
    ///
    /// The backend answers a refused start with a 4xx and a JSON
    /// `{"error": ...}` body. That is a rejection, not a transport
    /// failure, so such a reply is returned like a 2xx one.
    async fn parse_start_response(
        response: reqwest::Response,
    ) -> Result<StartResponse, TransportError> {
        let status = response.status();
        let body = response.text().await?;
        let parsed = serde_json::from_str::<StartResponse>(&body);

        if status.is_success() {
            return parsed.map_err(|e| TransportError::Decode(e.to_string()));
        }
        match parsed {
            Ok(reply) if reply.error.is_some() => Ok(reply),
            _ => Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn start_existing(&self, request: &RunRequest) -> Result<StartResponse, TransportError> {
        let response = self.post("/api/run").json(request).send().await?;
        Self::parse_start_response(response).await
    }

    async fn start_upload(
        &self,
        asset: &UploadedAsset,
        config: &UploadConfig,
    ) -> Result<StartResponse, TransportError> {
        let config_json =
            serde_json::to_string(config).map_err(|e| TransportError::Decode(e.to_string()))?;
        let file = Part::bytes(asset.bytes.clone())
            .file_name(asset.file_name.clone())
            .mime_str(&asset.content_type)?;
        let form = Form::new().part("file", file).text("config", config_json);

        let response = self.post("/api/upload").multipart(form).send().await?;
        Self::parse_start_response(response).await
    }

    async fn open_progress_stream(&self) -> Result<FrameStream, TransportError> {
        let response = self
            .client
            .get(self.url("/api/progress"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let frames = response
            .bytes_stream()
            .scan(SseDecoder::new(), |decoder, chunk| {
                let items: Vec<Result<String, TransportError>> = match chunk {
                    Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(TransportError::from(e))],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten()
            .boxed();

        Ok(frames)
    }

    /// Sent without the request timeout: stopping waits as long as the
    /// backend takes to answer.
    async fn stop_job(&self) -> Result<StopAck, TransportError> {
        let response = self.client.post(self.url("/api/stop")).send().await?;
        Self::parse_response(response).await
    }

    async fn cleanup(&self, temp_dir: &str) -> Result<(), TransportError> {
        let response = self
            .post("/api/cleanup")
            .json(&serde_json::json!({ "temp_dir": temp_dir }))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
