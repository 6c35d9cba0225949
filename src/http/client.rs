//! reqwest-backed [`Transport`]

use super::{ApiRequest, ApiResponse, Method, Transport, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Live transport; one pooled client for API calls, a throwaway client per probe
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        debug!("{:?} {}", request.method, request.url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        builder = builder.timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, request.timeout))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify(e, request.timeout))?;

        Ok(ApiResponse { status, body })
    }

    async fn probe(
        &self,
        proxy_url: &str,
        target: &str,
        timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| TransportError::InvalidProxy(e.to_string()))?;

        let client = Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        let response = client
            .get(target)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(e, timeout))?;

        Ok(ApiResponse { status, body })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Client(err)
    }
}
