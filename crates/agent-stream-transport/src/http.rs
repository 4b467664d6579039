//! HTTP transport: SSE task stream plus side-channel answer posts.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;

use agent_stream_core::{
    AnswerRequest, ByteStream, StreamTransport, TaskRequest, TransportError,
};

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL of the backend, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl HttpTransportConfig {
    /// Config with default timeouts.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Transport over HTTP: tasks are submitted with `POST` and observed through
/// the server-sent event stream of the response body; answers go through a
/// separate `POST` so they work while the stream is down.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Create a transport for the backend at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_config(HttpTransportConfig::new(base_url))
    }

    /// Create a transport with explicit configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_config(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, request: &TaskRequest) -> Result<ByteStream, TransportError> {
        let response = self
            .client
            .post(self.url("/api/tasks"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let response = Self::check_status(response).await?;

        tracing::debug!(url = %response.url(), "task stream opened");
        Ok(Box::pin(
            response
                .bytes_stream()
                .map_err(|e| TransportError::Stream(e.to_string())),
        ))
    }

    async fn answer(&self, request: &AnswerRequest) -> Result<(), TransportError> {
        let url = self.url(&format!("/api/tasks/{}/answer", request.session_id));
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Self::check_status(response).await?;
        Ok(())
    }
}
