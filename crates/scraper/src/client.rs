//! Search platform client
//!
//! The [`SearchPlatform`] trait is the seam between the pipeline and the
//! upstream HTTP API. Calls return raw bodies: deciding whether a body is
//! usable is the parsers' job, so only transport failures and server
//! errors surface as [`ScraperError`].

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use patentgraph_common::config::UpstreamConfig;
use patentgraph_common::metrics;
use reqwest::RequestBuilder;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::errors::ScraperError;

#[cfg(any(test, feature = "test-util"))]
mod mock;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockPlatform;

/// Upstream operations, used for metrics labels and test doubles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Search,
    Export,
    Document,
    Family,
    SimilarSearch,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Search => "search",
            Endpoint::Export => "report",
            Endpoint::Document => "docs",
            Endpoint::Family => "similar_family",
            Endpoint::SimilarSearch => "thesaurus_search",
        }
    }
}

/// Upstream search platform
#[async_trait]
pub trait SearchPlatform: Send + Sync {
    /// Full-text search, JSON body
    async fn search(&self, body: &Value) -> Result<Vec<u8>, ScraperError>;

    /// Spreadsheet export of a search, xlsx body
    async fn export(&self, body: &Value) -> Result<Vec<u8>, ScraperError>;

    /// One document's full record, JSON body
    async fn document(&self, id: &str) -> Result<Vec<u8>, ScraperError>;

    /// Simple-family similarity hits for one document, JSON body
    async fn similar_family(&self, id: &str) -> Result<Vec<u8>, ScraperError>;

    /// Thesaurus search by identifier, JSON body
    async fn similar_search(&self, body: &Value, page: u32, size: u32) -> Result<Vec<u8>, ScraperError>;
}

/// reqwest-backed client for the Rospatent search platform
pub struct RospatentClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    throttle: Option<DefaultDirectRateLimiter>,
}

impl RospatentClient {
    /// Create a client from configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self, ScraperError> {
        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        let throttle = NonZeroU32::new(config.requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            throttle,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Timeouts get their own variant so callers can answer 504
    fn transport_error(&self, endpoint: Endpoint, source: reqwest::Error) -> ScraperError {
        if source.is_timeout() {
            ScraperError::UpstreamTimeout {
                endpoint: endpoint.as_str(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ScraperError::Upstream {
                endpoint: endpoint.as_str(),
                source,
            }
        }
    }

    /// Send with the cache-busting timestamp, record metrics, read the body
    async fn send(&self, endpoint: Endpoint, request: RequestBuilder) -> Result<Vec<u8>, ScraperError> {
        if let Some(ref throttle) = self.throttle {
            throttle.until_ready().await;
        }

        let start = Instant::now();
        let result = self.execute(endpoint, request).await;
        metrics::record_upstream(endpoint.as_str(), start.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    async fn execute(&self, endpoint: Endpoint, request: RequestBuilder) -> Result<Vec<u8>, ScraperError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let response = request
            .query(&[("t", timestamp)])
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|source| self.transport_error(endpoint, source))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ScraperError::UpstreamStatus {
                endpoint: endpoint.as_str(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            warn!(endpoint = endpoint.as_str(), status = status.as_u16(), "Upstream rejected request");
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| self.transport_error(endpoint, source))?;
        debug!(endpoint = endpoint.as_str(), bytes = body.len(), "Upstream response received");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl SearchPlatform for RospatentClient {
    async fn search(&self, body: &Value) -> Result<Vec<u8>, ScraperError> {
        let request = self.client.post(self.url("search")).json(body);
        self.send(Endpoint::Search, request).await
    }

    async fn export(&self, body: &Value) -> Result<Vec<u8>, ScraperError> {
        let request = self.client.post(self.url("report")).json(body);
        self.send(Endpoint::Export, request).await
    }

    async fn document(&self, id: &str) -> Result<Vec<u8>, ScraperError> {
        let body = serde_json::json!({ "pre_tag": "", "post_tag": "" });
        let request = self.client.post(self.url(&format!("docs/{}", id))).json(&body);
        self.send(Endpoint::Document, request).await
    }

    async fn similar_family(&self, id: &str) -> Result<Vec<u8>, ScraperError> {
        let request = self.client.get(self.url(&format!("similar/family/simple/{}", id)));
        self.send(Endpoint::Family, request).await
    }

    async fn similar_search(&self, body: &Value, page: u32, size: u32) -> Result<Vec<u8>, ScraperError> {
        let request = self
            .client
            .post(self.url("esi/rest_api/api/v1/services/thesaurus-search/api/v1/search"))
            .query(&[("page", page), ("size", size)])
            .json(body);
        self.send(Endpoint::SimilarSearch, request).await
    }
}
