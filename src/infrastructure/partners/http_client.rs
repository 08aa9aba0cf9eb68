//! # HTTP Partner Client
//!
//! `reqwest`-based [`PartnerClient`] posting JSON to `{base_url}/deals`.
//!
//! Every request carries a bearer token and an `Idempotency-Key` header.
//! The timeout is set per request from the partner's configuration.
//!
//! # Examples
//!
//! ```ignore
//! use deal_router::infrastructure::partners::http_client::HttpPartnerClient;
//!
//! let client = HttpPartnerClient::new()?;
//! let deal = client.create_remote_deal(&endpoint, &request).await?;
//! ```

use crate::infrastructure::partners::error::{PartnerError, PartnerResult};
use crate::infrastructure::partners::traits::{
    PartnerClient, PartnerEndpoint, RemoteDeal, RemoteDealRequest,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

/// Header carrying the per-attempt idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// HTTP implementation of [`PartnerClient`].
#[derive(Debug, Clone)]
pub struct HttpPartnerClient {
    client: Client,
}

impl HttpPartnerClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `PartnerError::InternalError` if the client cannot be created.
    pub fn new() -> PartnerResult<Self> {
        let client = Client::builder().build().map_err(|e| {
            PartnerError::internal_error(format!("Failed to create HTTP client: {e}"))
        })?;
        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn handle_response(&self, response: Response) -> PartnerResult<RemoteDeal> {
        let status = response.status();
        if status.is_success() {
            response.json::<RemoteDeal>().await.map_err(|e| {
                PartnerError::protocol_error(format!("Failed to parse response: {e}"))
                    .with_status(status.as_u16())
            })
        } else {
            let error_body = response.text().await.unwrap_or_default();
            Err(Self::map_status_error(status, &error_body))
        }
    }

    fn map_reqwest_error(error: &reqwest::Error, timeout_ms: u64) -> PartnerError {
        if error.is_timeout() {
            PartnerError::timeout_with_duration("Request timed out", timeout_ms)
        } else if error.is_connect() {
            PartnerError::connection(format!("Connection failed: {error}"))
        } else {
            PartnerError::connection(format!("HTTP request failed: {error}"))
        }
    }

    fn map_status_error(status: StatusCode, body: &str) -> PartnerError {
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                PartnerError::invalid_request(format!("Bad request: {body}"))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                PartnerError::authentication(format!("Authentication failed: {body}"))
            }
            StatusCode::CONFLICT => PartnerError::rejected(format!("Deal refused: {body}")),
            StatusCode::NOT_FOUND => {
                PartnerError::protocol_error(format!("Resource not found: {body}"))
                    .with_status(status.as_u16())
            }
            StatusCode::TOO_MANY_REQUESTS => PartnerError::rate_limited("Rate limit exceeded"),
            s if s.is_server_error() => {
                PartnerError::connection(format!("Server error ({status}): {body}"))
                    .with_status(status.as_u16())
            }
            _ => PartnerError::protocol_error(format!("HTTP error ({status}): {body}"))
                .with_status(status.as_u16()),
        }
    }
}

#[async_trait]
impl PartnerClient for HttpPartnerClient {
    async fn create_remote_deal(
        &self,
        endpoint: &PartnerEndpoint,
        request: &RemoteDealRequest,
    ) -> PartnerResult<RemoteDeal> {
        let url = format!("{}/deals", endpoint.base_url);
        let timeout_ms = u64::try_from(endpoint.timeout.as_millis()).unwrap_or(u64::MAX);
        let response = self
            .client
            .post(&url)
            .timeout(endpoint.timeout)
            .bearer_auth(&endpoint.api_token)
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_reqwest_error(&e, timeout_ms))?;
        self.handle_response(response).await
    }
}
