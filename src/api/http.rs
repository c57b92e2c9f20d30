//! HTTP client for the relationship and presence APIs

use super::types::{self, *};
use super::{ConnectionApi, PresenceApi};
use crate::config::ApiConfig;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde_json::Value;
use std::time::Duration;

/// HTTP client for the social API
///
/// # Example
///
/// ```rust,no_run
/// use elohim_network_sync::{ApiConfig, HttpApiClient};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpApiClient::new(&ApiConfig {
///     base_url: "https://social.example.com/api".into(),
///     api_token: Some("token".into()),
///     ..Default::default()
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct HttpApiClient {
    base_url: String,
    client: Client,
}

impl HttpApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = config.api_token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| SyncError::Config(format!("invalid api token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ==================== Helper Methods ====================

    async fn check_status(response: Response) -> Result<Response> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Server { status, message });
        }
        Ok(response)
    }

    /// JSON body of a successful response; an empty body reads as `null`.
    async fn json_body(response: Response) -> Result<Value> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::InvalidResponse(format!("response is not JSON: {}", e)))
    }
}

#[async_trait]
impl ConnectionApi for HttpApiClient {
    async fn send_request(&self, target_id: &str, message: Option<&str>) -> Result<Option<String>> {
        let body = SendRequestBody {
            target_id: target_id.to_string(),
            message: message.map(str::to_string),
        };

        let response = self
            .client
            .post(self.url("/connections/requests"))
            .json(&body)
            .send()
            .await?;

        types::parse_send_response(&Self::json_body(response).await?)
    }

    async fn list_outgoing_pending(&self) -> Result<Vec<PendingRequest>> {
        let response = self
            .client
            .get(self.url("/connections/requests"))
            .query(&[("status", "pending"), ("direction", "outgoing")])
            .send()
            .await?;

        types::parse_pending_requests(&Self::json_body(response).await?)
    }

    async fn accept_request(&self, request_id: &str) -> Result<()> {
        let body = AcceptRequestBody {
            request_id: request_id.to_string(),
        };

        let response = self
            .client
            .post(self.url("/connections/accept"))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn decline_request(&self, request_id: &str) -> Result<()> {
        let url = self.url(&format!(
            "/connections/requests/{}/decline",
            urlencoding::encode(request_id)
        ));

        let response = self.client.post(&url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn cancel_request(&self, request_id: &str) -> Result<()> {
        let url = self.url(&format!(
            "/connections/requests/{}",
            urlencoding::encode(request_id)
        ));

        let response = self.client.delete(&url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn suggestions(&self, query: &SuggestionQuery) -> Result<Vec<Suggestion>> {
        let response = self
            .client
            .get(self.url("/network/suggestions"))
            .query(&query.params())
            .send()
            .await?;
        types::parse_suggestions(&Self::json_body(response).await?)
    }
}

#[async_trait]
impl PresenceApi for HttpApiClient {
    async fn update_location(&self, update: &LocationUpdate) -> Result<()> {
        let response = self
            .client
            .put(self.url("/presence/location"))
            .json(update)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }
}
