//! HTTP transport for vendor API calls and proxy probes
//!
//! Every stage of the pipeline talks to the network through [`Transport`],
//! so the whole flow can be replayed against canned responses in tests.

pub mod client;

#[cfg(test)]
pub mod testing;

pub use client::ReqwestTransport;

use crate::error::{FetchError, Stage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// A single outbound API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout,
        }
    }

    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self::new(Method::Get, url, timeout)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {}", token))
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("authorization").map(String::as_str)
    }
}

/// Status and raw body of a completed call
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON, `None` when it isn't
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Network seam used by every stage
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a direct API call
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;

    /// Fetch `target` routed through the proxy at `proxy_url`
    async fn probe(
        &self,
        proxy_url: &str,
        target: &str,
        timeout: Duration,
    ) -> Result<ApiResponse, TransportError>;
}

/// Execute a request and turn transport failures and non-2xx statuses into
/// stage-tagged errors.
pub async fn send_checked(
    transport: &dyn Transport,
    stage: Stage,
    request: ApiRequest,
) -> Result<ApiResponse, FetchError> {
    let response = transport
        .execute(request)
        .await
        .map_err(|source| FetchError::Network { stage, source })?;

    if !response.is_success() {
        return Err(FetchError::from_status(stage, response));
    }
    Ok(response)
}
