//! Fulfillment API client
//!
//! `OrderSubmitter` is the seam between the engine and the network: the
//! runner only sees status + body, so tests swap in canned responders.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::order::{IdempotencyKey, OrderRequest};

/// Raw response of one order-creation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body cut to `max` characters for log lines
    pub fn truncated_body(&self, max: usize) -> &str {
        truncate(&self.body, max)
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Sends one order-creation request
///
/// `Err` means no HTTP response was obtained (connect failure, timeout,
/// broken body); any status code, including 4xx/5xx, is `Ok`.
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
    async fn submit(&self, request: &OrderRequest, key: &IdempotencyKey) -> Result<ApiResponse>;
}

/// `POST {base_url}/fulfillment_orders` over reqwest
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSubmitter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OrderSubmitter for HttpSubmitter {
    async fn submit(&self, request: &OrderRequest, key: &IdempotencyKey) -> Result<ApiResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Idempotency-Key", key.as_str())
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.endpoint))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(ApiResponse { status, body })
    }
}
