//! Outbound HTTP collaborator.
//!
//! Everything that leaves the process (log batches, alert channels, error
//! events) goes through [`HttpClient`]. Production uses [`ReqwestClient`];
//! tests substitute a fake or point the real client at a local collector.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
}

impl HttpResponse {
    pub fn from_status(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            ok: (200..300).contains(&status),
            status,
            status_text: status_text.into(),
        }
    }

    /// Turn a non-2xx response into an error.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.ok {
            Ok(self)
        } else {
            Err(TransportError::Status {
                status: self.status,
                status_text: self.status_text,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} {status_text}")]
    Status { status: u16, status_text: String },

    #[error("request body could not be encoded: {0}")]
    Encode(String),

    #[error("no endpoint configured")]
    NotConfigured,
}

/// `post(url, body, headers) -> {ok, status, status_text}`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;
}

/// Standard headers for an authenticated JSON POST.
pub fn json_headers(api_key: Option<&str>) -> Vec<(String, String)> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        headers.push(("Authorization".to_string(), format!("Bearer {key}")));
    }
    headers
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("telemetry-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        Ok(HttpResponse::from_status(
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(HttpResponse::from_status(204, "No Content").ok);
        assert!(!HttpResponse::from_status(302, "Found").ok);
        let err = HttpResponse::from_status(503, "Service Unavailable")
            .error_for_status()
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503 Service Unavailable");
    }

    #[test]
    fn test_json_headers() {
        let headers = json_headers(Some("k-123"));
        assert!(headers.contains(&("Content-Type".into(), "application/json".into())));
        assert!(headers.contains(&("Authorization".into(), "Bearer k-123".into())));
        assert_eq!(json_headers(Some("")).len(), 1);
        assert_eq!(json_headers(None).len(), 1);
    }
}
