//! HTTP API client used by the polling fallback and the CLI.

use async_trait::async_trait;
use kycwatch_shared::ApiError;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::{poll_path_for, RealtimeConfig, DEFAULT_POLL_PATH};
use crate::realtime::KycFetcher;

/// HTTP client for the KYC REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
    poll_path: String,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            bearer_token: None,
            poll_path: DEFAULT_POLL_PATH.to_string(),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        let client = Self::new()
            .with_base_url(&config.api_base)
            .with_poll_path(&config.poll_path);
        match &config.api_token {
            Some(token) => client.with_bearer_token(token),
            None => client,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach `Authorization: Bearer <token>` to every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Path template of the KYC status resource (`{key}` is substituted)
    pub fn with_poll_path(mut self, template: impl Into<String>) -> Self {
        self.poll_path = template.into();
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.get(self.url(path)));
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        read_json(resp).await
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let body_bytes =
            serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;

        let rb = self
            .authorize(self.client.post(self.url(path)))
            .header("Content-Type", "application/json")
            .body(body_bytes);
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        read_json(resp).await
    }
}

async fn read_json<TRes: DeserializeOwned>(resp: Response) -> Result<TRes, ApiError> {
    let status = resp.status().as_u16();
    let is_success = resp.status().is_success();

    let text = resp
        .text()
        .await
        .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

    if !is_success {
        return Err(ApiError::Http { status, body: text });
    }

    if text.is_empty() {
        serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
    } else {
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }
}

#[async_trait]
impl KycFetcher for ApiClient {
    async fn fetch_kyc(&self, key: &str) -> Result<Value, ApiError> {
        self.get_json(&poll_path_for(&self.poll_path, key)).await
    }
}
