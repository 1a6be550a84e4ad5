//! Collector HTTP client implementation

use std::time::Duration;

use async_trait::async_trait;
use fieldlink_core::{CollectorApi, CollectorResult, SampleRecord, SessionId};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::config::CollectorConfig;
use crate::error::{ClientError, Result};
use crate::types::{CreateSessionRequest, ErrorResponse, SessionResponse};

/// Session ids are opaque; keep them a single path segment
fn encode_path_segment(id: &str) -> String {
    id.replace('/', "%2F")
}

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Collector REST API client
#[derive(Debug, Clone)]
pub struct CollectorClient {
    client: Client,
    base_url: Url,
}

impl CollectorClient {
    /// Create a new collector client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the collector (e.g., "http://localhost:8080")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a new collector client with custom timeouts
    pub fn with_config(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        let base_url = Url::parse(base_url)?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        Self::with_config(&config.base_url, config.timeout(), config.connect_timeout())
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // =========================================================================
    // Health Check
    // =========================================================================

    /// Check collector health
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<String> {
        let url = self.base_url.join("/health")?;
        let response = self.client.get(url).send().await?;

        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Open a telemetry session
    #[instrument(skip(self))]
    pub async fn open_session(
        &self,
        client_id: &str,
        adapter_type: &str,
        protocol_name: &str,
    ) -> Result<SessionId> {
        let url = self.base_url.join("/api/sessions")?;
        let body = CreateSessionRequest {
            client_id: client_id.to_string(),
            adapter_type: adapter_type.to_string(),
            protocol_name: protocol_name.to_string(),
        };

        let response = self.client.post(url).json(&body).send().await?;
        let session: SessionResponse = self.handle_response(response).await?;
        debug!(session_id = %session.id, "Collector session opened");
        Ok(session.id)
    }

    /// Close a telemetry session
    #[instrument(skip(self))]
    pub async fn close_session(&self, session_id: &SessionId) -> Result<()> {
        let url = self.base_url.join(&format!(
            "/api/sessions/{}/end",
            encode_path_segment(&session_id.0)
        ))?;

        let response = self.client.post(url).send().await?;
        self.handle_empty(response).await
    }

    // =========================================================================
    // Samples
    // =========================================================================

    /// Submit one sample
    #[instrument(skip(self, record), fields(session_id = %record.session_id))]
    pub async fn submit_sample(&self, record: &SampleRecord) -> Result<()> {
        let url = self.base_url.join("/api/samples")?;
        let response = self.client.post(url).json(record).send().await?;
        self.handle_empty(response).await
    }

    // =========================================================================
    // Response handling
    // =========================================================================

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ClientError::ParseError(e.to_string()))
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    async fn handle_empty(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    /// Extract error from failed response
    async fn extract_error(&self, response: reqwest::Response) -> ClientError {
        let status = response.status();
        self.extract_error_from_status(response, status).await
    }

    async fn extract_error_from_status(
        &self,
        response: reqwest::Response,
        status: StatusCode,
    ) -> ClientError {
        // Try to parse error response body
        let message = match response.json::<ErrorResponse>().await {
            Ok(err) => err.error,
            Err(_) => format!("HTTP {}", status),
        };

        match status {
            StatusCode::NOT_FOUND => ClientError::SessionNotFound(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ClientError::Timeout,
            _ => ClientError::server_error(status.as_u16(), message),
        }
    }
}

#[async_trait]
impl CollectorApi for CollectorClient {
    async fn create_session(
        &self,
        client_id: &str,
        adapter_type: &str,
        protocol_name: &str,
    ) -> CollectorResult<SessionId> {
        Ok(self
            .open_session(client_id, adapter_type, protocol_name)
            .await?)
    }

    async fn create_sample(&self, record: &SampleRecord) -> CollectorResult<()> {
        Ok(self.submit_sample(record).await?)
    }

    async fn end_session(&self, session_id: &SessionId) -> CollectorResult<()> {
        Ok(self.close_session(session_id).await?)
    }
}
