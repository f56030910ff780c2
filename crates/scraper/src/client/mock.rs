//! Canned-response platform for tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{Endpoint, SearchPlatform};
use crate::errors::ScraperError;

/// Canned-response platform for testing
#[derive(Default)]
pub struct MockPlatform {
    search: Option<Vec<u8>>,
    export: Option<Vec<u8>>,
    documents: HashMap<String, Vec<u8>>,
    families: HashMap<String, Vec<u8>>,
    similar: Option<Vec<u8>>,
    failing: HashSet<Endpoint>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(Endpoint, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, body: Value) -> Self {
        self.search = Some(body.to_string().into_bytes());
        self
    }

    pub fn with_export(mut self, xlsx: Vec<u8>) -> Self {
        self.export = Some(xlsx);
        self
    }

    pub fn with_document(self, id: &str, body: Value) -> Self {
        self.with_document_raw(id, body.to_string().into_bytes())
    }

    pub fn with_document_raw(mut self, id: &str, body: Vec<u8>) -> Self {
        self.documents.insert(id.to_string(), body);
        self
    }

    pub fn with_family(mut self, id: &str, body: Value) -> Self {
        self.families.insert(id.to_string(), body.to_string().into_bytes());
        self
    }

    pub fn with_similar(mut self, body: Value) -> Self {
        self.similar = Some(body.to_string().into_bytes());
        self
    }

    /// Make every call to `endpoint` fail like an unreachable upstream
    pub fn failing(mut self, endpoint: Endpoint) -> Self {
        self.failing.insert(endpoint);
        self
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls made to `endpoint`
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|(e, _)| *e == endpoint).count())
            .unwrap_or_default()
    }

    /// Identifiers requested from `endpoint`, in call order
    pub fn requested(&self, endpoint: Endpoint) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|(e, _)| *e == endpoint).map(|(_, id)| id.clone()).collect())
            .unwrap_or_default()
    }

    /// Highest number of calls that were in progress at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, endpoint: Endpoint, key: &str, body: Option<&Vec<u8>>) -> Result<Vec<u8>, ScraperError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((endpoint, key.to_string()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&endpoint) {
            return Err(ScraperError::UpstreamStatus {
                endpoint: endpoint.as_str(),
                status: 503,
            });
        }
        Ok(body.cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SearchPlatform for MockPlatform {
    async fn search(&self, _body: &Value) -> Result<Vec<u8>, ScraperError> {
        self.respond(Endpoint::Search, "", self.search.as_ref()).await
    }

    async fn export(&self, _body: &Value) -> Result<Vec<u8>, ScraperError> {
        self.respond(Endpoint::Export, "", self.export.as_ref()).await
    }

    async fn document(&self, id: &str) -> Result<Vec<u8>, ScraperError> {
        self.respond(Endpoint::Document, id, self.documents.get(id)).await
    }

    async fn similar_family(&self, id: &str) -> Result<Vec<u8>, ScraperError> {
        self.respond(Endpoint::Family, id, self.families.get(id)).await
    }

    async fn similar_search(&self, body: &Value, _page: u32, _size: u32) -> Result<Vec<u8>, ScraperError> {
        let id = body["pat_id"].as_str().unwrap_or_default().to_string();
        self.respond(Endpoint::SimilarSearch, &id, self.similar.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let mock = MockPlatform::new().with_document("RU1", serde_json::json!({"id": "RU1"}));
        assert!(!mock.document("RU1").await.unwrap().is_empty());
        assert!(mock.document("RU2").await.unwrap().is_empty());
        assert_eq!(mock.calls(Endpoint::Document), 2);
        assert_eq!(mock.requested(Endpoint::Document), vec!["RU1", "RU2"]);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockPlatform::new().failing(Endpoint::Family);
        let err = mock.similar_family("RU1").await.unwrap_err();
        assert!(matches!(err, ScraperError::UpstreamStatus { status: 503, .. }));
    }
}
