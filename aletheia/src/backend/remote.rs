use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{AnalysisBackend, AnalyzeRequest, ImageUpload, Verdict};

/// Filename the backend sees for every uploaded image
const UPLOAD_FILENAME: &str = "image.jpg";

/// Upper bound on the startup reachability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Analysis backend reached over HTTP
pub struct RemoteBackend {
    base_url: String,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl RemoteBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    /// Bound every backend request. Without this requests wait indefinitely.
    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout = timeout_secs.map(Duration::from_secs);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Probe `GET /` once so misconfiguration shows up in the startup logs.
    /// Bounded by its own short timeout; returns whether the backend answered 2xx.
    pub async fn check_reachable(&self) -> bool {
        let probe = self.send(self.client.get(self.endpoint("/")));
        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(resp)) if resp.status().is_success() => {
                info!(backend = %self.base_url, "analysis backend reachable");
                true
            }
            Ok(Ok(resp)) => {
                warn!(backend = %self.base_url, status = %resp.status(), "analysis backend answered with an error");
                false
            }
            Ok(Err(e)) => {
                warn!(backend = %self.base_url, error = %e, "analysis backend unreachable");
                false
            }
            Err(_) => {
                warn!(backend = %self.base_url, timeout = ?PROBE_TIMEOUT, "analysis backend did not answer the startup probe");
                false
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.context("failed to call backend")
    }

    /// Run a whole exchange (request and body) under the configured timeout.
    async fn bounded<T, F>(&self, exchange: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .context("backend request timed out")?,
            None => exchange.await,
        }
    }

    async fn read_verdict(&self, response: reqwest::Response) -> Result<Verdict> {
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("backend returned status {}: {}", status, body);
        }

        let verdict: Verdict = response
            .json()
            .await
            .context("failed to decode backend response")?;
        debug!(
            is_news = verdict.is_news,
            is_misinformation = verdict.is_misinformation,
            confidence = verdict.confidence,
            "verdict received"
        );
        Ok(verdict)
    }
}

#[async_trait::async_trait]
impl AnalysisBackend for RemoteBackend {
    async fn analyze_text(&self, text: &str) -> Result<Verdict> {
        let request = self
            .client
            .post(self.endpoint("analyze/text"))
            .json(&AnalyzeRequest { text });

        self.bounded(async {
            let response = self.send(request).await?;
            self.read_verdict(response).await
        })
        .await
    }

    async fn analyze_image(&self, image: ImageUpload) -> Result<Verdict> {
        let mime = image.mime_type.as_deref().unwrap_or("image/jpeg");
        let size = image.data.len();
        let part = Part::bytes(image.data)
            .file_name(UPLOAD_FILENAME)
            .mime_str(mime)
            .with_context(|| format!("invalid image mime type: {}", mime))?;
        let form = Form::new().part("file", part);

        debug!(bytes = size, mime, "uploading image for analysis");
        let request = self.client.post(self.endpoint("analyze/image")).multipart(form);

        let verdict = self
            .bounded(async {
                let response = self.send(request).await?;
                self.read_verdict(response).await
            })
            .await?;
        if let Some(text) = verdict.extracted_text.as_deref().filter(|t| !t.is_empty()) {
            debug!(chars = text.chars().count(), "backend extracted text from image");
        }
        Ok(verdict)
    }
}
