// Outbound fetch capability used by the coordinator
use crate::cache::FetchError;
use crate::config::DEFAULT_USER_AGENT;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, USER_AGENT};
use tracing::warn;

/// Raw response handed back by a transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Check if the response was successful (2xx status).
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `fetch(url) -> {status, body}` shaped capability.
///
/// Implementations report connection-level failures as [`FetchError::Transport`];
/// status codes are interpreted by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<TransportResponse, FetchError>;
}

/// Transport backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport
    ///
    /// # Errors
    ///
    /// Will return `Err` if the underlying client cannot be built (TLS backend init)
    pub fn new(custom_user_agent: Option<&str>) -> Result<Self> {
        let user_agent = match custom_user_agent.map(HeaderValue::from_str) {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                // Invalid header value; keep the default user-agent
                warn!("Ignoring invalid user agent: {}", e);
                HeaderValue::from_static(DEFAULT_USER_AGENT)
            }
            None => HeaderValue::from_static(DEFAULT_USER_AGENT),
        };

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(USER_AGENT, user_agent);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> std::result::Result<TransportResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_success() {
        assert!(TransportResponse::new(200, "").is_success());
        assert!(TransportResponse::new(204, "").is_success());
        assert!(!TransportResponse::new(199, "").is_success());
        assert!(!TransportResponse::new(304, "").is_success());
        assert!(!TransportResponse::new(500, "").is_success());
    }

    #[test]
    fn test_http_transport_accepts_invalid_user_agent() {
        assert!(HttpTransport::new(Some("fetchcache/1.0")).is_ok());
        assert!(HttpTransport::new(Some("\u{007F}InvalidAgent")).is_ok());
        assert!(HttpTransport::new(None).is_ok());
    }
}
