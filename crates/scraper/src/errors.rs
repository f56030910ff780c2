//! Aggregation error types

use patentgraph_common::errors::AppError;
use thiserror::Error;

/// Batch-level aggregation failure
///
/// Malformed upstream bodies never show up here: parsers degrade them.
#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Upstream {endpoint} request failed: {source}")]
    Upstream {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream {endpoint} timed out after {timeout_ms}ms")]
    UpstreamTimeout { endpoint: &'static str, timeout_ms: u64 },

    #[error("Upstream {endpoint} returned status {status}")]
    UpstreamStatus { endpoint: &'static str, status: u16 },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] AppError),

    #[error("Concurrency limiter closed")]
    Concurrency(#[from] tokio::sync::AcquireError),

    #[error("Invalid request: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for ScraperError {
    fn from(e: validator::ValidationErrors) -> Self {
        ScraperError::Validation(e.to_string())
    }
}

impl From<ScraperError> for AppError {
    fn from(e: ScraperError) -> Self {
        match e {
            ScraperError::Upstream { source, .. } => AppError::HttpClient(source),
            ScraperError::UpstreamTimeout { endpoint, timeout_ms } => AppError::UpstreamTimeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            },
            ScraperError::UpstreamStatus { endpoint, status } => AppError::Upstream {
                message: format!("{} returned status {}", endpoint, status),
            },
            ScraperError::Http(e) => AppError::HttpClient(e),
            ScraperError::Storage(e) => e,
            ScraperError::Concurrency(e) => AppError::ServiceUnavailable {
                message: e.to_string(),
            },
            ScraperError::Validation(message) => AppError::Validation { message, field: None },
        }
    }
}
