//! # Network
//!
//! The fetch side of the cache. `HttpNetwork` classifies every answer
//! against the terminal's own origin, so only same-origin responses come
//! back as [`ResponseKind::Basic`] and become cacheable.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;
use url::{Origin, Url};

use crate::error::{CacheError, CacheResult};
use crate::http::{Request, Response, ResponseKind};

#[async_trait]
pub trait Network: Send + Sync {
    /// Fetches `request`. Any HTTP status is a response; only transport
    /// failures are errors.
    async fn fetch(&self, request: &Request) -> CacheResult<Response>;
}

pub struct HttpNetwork {
    client: reqwest::Client,
    origin: Origin,
}

impl HttpNetwork {
    pub fn new(origin: &Url, timeout: Duration) -> CacheResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpNetwork {
            client,
            origin: origin.origin(),
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> CacheResult<Response> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| CacheError::Network(e.to_string()))?;

        let response = self
            .client
            .request(method, request.url.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let kind = if response.url().origin() == self.origin {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status, ?kind, "Fetched");
        Ok(Response {
            status,
            kind,
            content_type,
            body,
        })
    }
}
