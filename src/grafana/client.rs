//! Authenticated HTTP client for the Grafana API

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;

/// Client for one Grafana instance
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    http_client: reqwest::Client,
    base_url: Url,
}

/// Status and body of a completed request
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GrafanaError> {
        serde_json::from_str(&self.body).map_err(|e| GrafanaError::Deserialization(e.to_string()))
    }

    /// The `message` field Grafana puts in error bodies, if any
    pub fn message(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_default()
    }

    /// Error for a status the caller does not handle
    pub fn unexpected(&self, operation: &str) -> GrafanaError {
        GrafanaError::UnexpectedStatus {
            operation: operation.to_string(),
            status: self.status.as_u16(),
            message: self.message(),
        }
    }
}

impl GrafanaClient {
    /// Create a client sending `token` as bearer credentials on every request
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, GrafanaError> {
        Self::with_builder(reqwest::Client::builder(), base_url, token, timeout)
    }

    /// Like [`GrafanaClient::new`], starting from a preconfigured builder
    pub fn with_builder(
        builder: reqwest::ClientBuilder,
        base_url: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, GrafanaError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| GrafanaError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| GrafanaError::InvalidToken)?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("sigma-deploy/", env!("CARGO_PKG_VERSION"))),
        );

        let http_client = builder
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| GrafanaError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of an API endpoint below the base URL. Segments are percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, GrafanaError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GrafanaError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Issue a request and collect the response. Only transport failures are
    /// errors here; status handling is left to the caller.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<ApiResponse, GrafanaError> {
        let mut request = self.http_client.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GrafanaError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GrafanaError::Network(e.to_string()))?;

        tracing::debug!(method = %method, url = %url, status = status.as_u16(), "Grafana request");
        Ok(ApiResponse { status, body })
    }

    pub async fn get(&self, segments: &[&str]) -> Result<ApiResponse, GrafanaError> {
        let url = self.endpoint(segments)?;
        self.send(Method::GET, url, None).await
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<ApiResponse, GrafanaError> {
        let url = self.endpoint(segments)?;
        self.send(Method::DELETE, url, None).await
    }

    pub async fn post(&self, segments: &[&str], body: Vec<u8>) -> Result<ApiResponse, GrafanaError> {
        let url = self.endpoint(segments)?;
        self.send(Method::POST, url, Some(body)).await
    }

    pub async fn put(&self, segments: &[&str], body: Vec<u8>) -> Result<ApiResponse, GrafanaError> {
        let url = self.endpoint(segments)?;
        self.send(Method::PUT, url, Some(body)).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrafanaError {
    #[error("Invalid Grafana URL: {0}")]
    InvalidUrl(String),

    #[error("Service account token contains invalid characters")]
    InvalidToken,

    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Error during {operation}: returned status {status} {message}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Empty response body from {0}")]
    EmptyBody(String),
}
