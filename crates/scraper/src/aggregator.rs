//! Concurrent aggregation driver
//!
//! Runs the three-phase pipeline and hands the reconciled batch to the store:
//!
//! 1. search and export run concurrently and are reconciled per identifier
//! 2. persisted deep-field state selects the identifiers still missing text
//! 3. detail and family fetches fan out per missing identifier
//!
//! Each phase is a barrier. Every upstream call in a fan-out holds a permit
//! from a shared semaphore sized by `upstream.max_concurrent_requests`. All
//! network I/O finishes before the single persistence transaction opens.
//!
//! A transport failure or 5xx from any call aborts the batch before anything
//! is written. Malformed bodies degrade inside the parsers instead.

use futures::future::try_join_all;
use patentgraph_common::config::UpstreamConfig;
use patentgraph_common::domain::{
    FamilySimilarityEdge, SearchPage, SearchRequest, SearchSimilarityEdge, SimilarSearchRequest,
};
use patentgraph_common::{Patent, PatentStore};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use validator::Validate;

use crate::client::SearchPlatform;
use crate::edges::extract;
use crate::errors::ScraperError;
use crate::merge::{apply_details, apply_persisted, merge_fragments, reconcile_search};
use crate::normalize::{normalize_id, normalize_ids};
use crate::parsers::{fetch_detail, fetch_export, fetch_family, fetch_search, fetch_similar};
use crate::selector::missing_ids;

/// Entry point for every aggregation use case
pub struct Aggregator {
    platform: Arc<dyn SearchPlatform>,
    store: Arc<dyn PatentStore>,
    permits: Arc<Semaphore>,
    preferred_lang: String,
}

impl Aggregator {
    pub fn new(platform: Arc<dyn SearchPlatform>, store: Arc<dyn PatentStore>, config: &UpstreamConfig) -> Self {
        Self {
            platform,
            store,
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            preferred_lang: config.preferred_lang.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn PatentStore> {
        &self.store
    }

    /// Search, reconcile, enrich what is missing, persist, return the page
    #[instrument(skip(self, request), fields(limit = request.limit, offset = request.offset))]
    pub async fn aggregate(&self, request: &SearchRequest) -> Result<SearchPage, ScraperError> {
        request.validate()?;
        let platform = self.platform.as_ref();
        let lang = self.preferred_lang.as_str();

        let (search, export) = tokio::try_join!(
            fetch_search(platform, request, lang),
            fetch_export(platform, request, lang),
        )?;
        let SearchPage { total, mut patents } = reconcile_search(search, export);
        info!(phase = 1, count = patents.len(), total, "Search and export reconciled");

        let ids: Vec<String> = patents.iter().map(|p| p.id.clone()).collect();
        let persisted = self.store.deep_field_state(&ids).await?;
        let missing = missing_ids(&ids, &persisted);
        info!(phase = 2, missing = missing.len(), "Selected records to enrich");

        let (details, family) = self.fetch_enrichment(&missing).await?;
        apply_details(&mut patents, details);

        let fetched: HashSet<&String> = missing.iter().collect();
        let enriched: Vec<String> = ids.iter().filter(|id| !fetched.contains(id)).cloned().collect();
        if !enriched.is_empty() {
            let stored: HashMap<String, Patent> = self
                .store
                .existing_patents(&enriched)
                .await?
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect();
            for patent in patents.iter_mut() {
                if let Some(record) = stored.get(&patent.id) {
                    apply_persisted(patent, record);
                }
            }
        }
        info!(phase = 3, fetched = missing.len(), family = family.len(), "Enrichment merged");

        let batch = extract(patents, family);
        self.store.persist(&batch).await?;

        Ok(SearchPage {
            total,
            patents: batch.patents,
        })
    }

    /// Fetch detail and family data for identifiers that have no deep fields
    /// yet. Returns how many identifiers were fetched; already-enriched
    /// identifiers cost no upstream calls.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn enrich(&self, ids: &[String]) -> Result<usize, ScraperError> {
        let ids = normalize_ids(ids);
        let persisted = self.store.deep_field_state(&ids).await?;
        let missing = missing_ids(&ids, &persisted);
        if missing.is_empty() {
            info!("All records already enriched");
            return Ok(0);
        }

        let (details, family) = self.fetch_enrichment(&missing).await?;
        let batch = extract(merge_fragments(details), family);
        self.store.persist(&batch).await?;

        info!(enriched = missing.len(), references = batch.references.len(), "Records enriched");
        Ok(missing.len())
    }

    /// Family-similarity edges for one identifier, persisted with placeholders
    /// for both endpoints
    #[instrument(skip(self))]
    pub async fn similar_family(&self, id: &str) -> Result<Vec<FamilySimilarityEdge>, ScraperError> {
        let id = query_id(id)?;
        let edges = self.bounded(fetch_family(self.platform.as_ref(), &id)).await?;
        if !edges.is_empty() {
            let mut batch = extract(Vec::new(), edges.clone());
            batch.placeholders.push(id);
            self.store.persist(&batch).await?;
        }
        Ok(edges)
    }

    /// Persisted records, with classifications, entities and links
    pub async fn existing_records(&self, ids: &[String]) -> Result<Vec<Patent>, ScraperError> {
        Ok(self.store.existing_patents(&normalize_ids(ids)).await?)
    }

    /// Thesaurus search by identifier.
    ///
    /// Hits not yet persisted beyond a placeholder are fetched in full. The
    /// query identifier gets a placeholder and every hit a search-similarity
    /// edge. The returned page carries each hit's scores on top of its record.
    #[instrument(skip(self, request), fields(id = %request.id, count = request.count))]
    pub async fn search_similar(&self, request: &SimilarSearchRequest) -> Result<SearchPage, ScraperError> {
        request.validate()?;
        let search_id = query_id(&request.id)?;
        let request = SimilarSearchRequest {
            id: search_id.clone(),
            ..request.clone()
        };
        let platform = self.platform.as_ref();

        let page = self.bounded(fetch_similar(platform, &request)).await?;
        let hit_ids = normalize_ids(&page.patents.iter().map(|p| p.id.as_str()).collect::<Vec<_>>());

        let existing: HashMap<String, Patent> = self
            .store
            .existing_patents(&hit_ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let unknown: Vec<&String> = hit_ids
            .iter()
            .filter(|id| existing.get(*id).map_or(true, Patent::is_placeholder))
            .collect();
        debug!(hits = hit_ids.len(), unknown = unknown.len(), "Fetching unknown hits");

        let details = try_join_all(unknown.iter().map(|id| self.bounded(fetch_detail(platform, id)))).await?;
        let fetched: HashMap<String, Patent> = merge_fragments(details)
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        if !page.patents.is_empty() {
            let mut batch = extract(fetched.values().cloned().collect(), Vec::new());
            batch.placeholders.push(search_id.clone());
            batch.search_similarity = page
                .patents
                .iter()
                .map(|hit| SearchSimilarityEdge {
                    search_patent_id: search_id.clone(),
                    found_patent_id: hit.id.clone(),
                    similarity: hit.similarity,
                    similarity_norm: hit.similarity_norm,
                })
                .collect();
            self.store.persist(&batch).await?;
        }

        let patents = page
            .patents
            .into_iter()
            .map(|hit| {
                let record = fetched
                    .get(&hit.id)
                    .or_else(|| existing.get(&hit.id))
                    .cloned()
                    .unwrap_or_else(|| Patent::with_id(hit.id.clone()));
                Patent {
                    similarity: hit.similarity,
                    similarity_norm: hit.similarity_norm,
                    ..record
                }
            })
            .collect();

        Ok(SearchPage {
            total: page.total,
            patents,
        })
    }

    /// Phase-3 fan-out: one detail and one family call per identifier
    async fn fetch_enrichment(&self, ids: &[String]) -> Result<(Vec<Patent>, Vec<FamilySimilarityEdge>), ScraperError> {
        if ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let platform = self.platform.as_ref();

        let details = try_join_all(ids.iter().map(|id| self.bounded(fetch_detail(platform, id))));
        let families = try_join_all(ids.iter().map(|id| self.bounded(fetch_family(platform, id))));
        let (details, families) = tokio::try_join!(details, families)?;

        Ok((details, families.into_iter().flatten().collect()))
    }

    /// Run `task` while holding an upstream permit
    async fn bounded<T>(&self, task: impl Future<Output = Result<T, ScraperError>>) -> Result<T, ScraperError> {
        let _permit = self.permits.acquire().await?;
        task.await
    }
}

/// Normalized query identifier; nothing left after normalization is invalid
fn query_id(raw: &str) -> Result<String, ScraperError> {
    let id = normalize_id(raw);
    if id.trim().is_empty() {
        return Err(ScraperError::Validation("patent identifier is empty".to_string()));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Endpoint, MockPlatform};
    use crate::parsers::xlsx::tests::workbook;
    use patentgraph_common::domain::{AggregationResult, LinkEdge};
    use patentgraph_common::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn aggregator(platform: &Arc<MockPlatform>, store: &Arc<MemoryStore>) -> Aggregator {
        let config = UpstreamConfig {
            max_concurrent_requests: 2,
            ..Default::default()
        };
        Aggregator::new(platform.clone(), store.clone(), &config)
    }

    fn search_hit(id: &str, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "common": { "publication_date": "2023.01.01" },
            "biblio": { "ru": { "title": title, "patentee": [{ "name": "АО Завод" }] } }
        })
    }

    fn document(description: &str, referred: &[&str]) -> serde_json::Value {
        let referred: Vec<_> = referred.iter().map(|id| json!({ "id": id })).collect();
        json!({
            "description": { "ru": description },
            "referred_from": referred
        })
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_aggregate_reconciles_all_sources() {
        let platform = Arc::new(
            MockPlatform::new()
                .with_search(json!({ "total": 1, "hits": [search_hit("RU123_20230101", "Насос")] }))
                .with_export(workbook(&[
                    ("B3", "1"),
                    ("A9", "RU 123"),
                    ("B9", "2023.01.01"),
                    ("C9", "Насос"),
                    ("F9", "Описание"),
                ]))
                .with_document("RU123_20230101", document("Полное описание", &["RU999"]))
                .with_family(
                    "RU123_20230101",
                    json!({ "hits": [{ "id": "RU001", "similarity": 0.7, "similarity_norm": 0.6 }] }),
                ),
        );
        let store = Arc::new(MemoryStore::new());

        let page = aggregator(&platform, &store)
            .aggregate(&SearchRequest::default())
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.patents.len(), 1);
        let patent = &page.patents[0];
        assert_eq!(patent.title_ru.as_deref(), Some("Насос"));
        assert_eq!(patent.abstract_ru.as_deref(), Some("Описание"));
        assert_eq!(patent.description_ru.as_deref(), Some("Полное описание"));

        assert_eq!(store.commits(), 1);
        assert_eq!(store.references(), vec![LinkEdge::new("RU123_20230101", "RU999")]);
        let placeholder = store.existing_patents(&ids(&["RU999"])).await.unwrap();
        assert!(placeholder[0].is_placeholder());

        let family = store.family_edges();
        assert_eq!(family.len(), 1);
        assert_eq!(family[0].first_id, "RU001");
        assert_eq!(family[0].second_id, "RU123_20230101");
        assert_eq!(family[0].referred_id, "RU001");

        let stored = store.existing_patents(&ids(&["RU123_20230101"])).await.unwrap();
        assert_eq!(stored[0].abstract_ru.as_deref(), Some("Описание"));
        assert_eq!(stored[0].patentees_ru, Some(vec!["АО Завод".to_string()]));
    }

    #[tokio::test]
    async fn test_enrich_twice_makes_no_second_calls() {
        let platform = Arc::new(MockPlatform::new().with_document("RU1", document("Описание", &[])));
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(&platform, &store);

        assert_eq!(aggregator.enrich(&ids(&["RU1"])).await.unwrap(), 1);
        assert_eq!(platform.calls(Endpoint::Document), 1);
        assert_eq!(platform.calls(Endpoint::Family), 1);

        assert_eq!(aggregator.enrich(&ids(&["RU1"])).await.unwrap(), 0);
        assert_eq!(platform.calls(Endpoint::Document), 1);
        assert_eq!(platform.calls(Endpoint::Family), 1);
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn test_malformed_detail_degrades_without_failing_batch() {
        let platform = Arc::new(
            MockPlatform::new()
                .with_document_raw("X1", b"{\"claims\": ".to_vec())
                .with_document("X2", document("Описание", &["RU999"])),
        );
        let store = Arc::new(MemoryStore::new());

        let enriched = aggregator(&platform, &store).enrich(&ids(&["X1", "X2"])).await.unwrap();
        assert_eq!(enriched, 2);
        assert_eq!(store.commits(), 1);

        let stored = store.existing_patents(&ids(&["X1", "X2"])).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|p| p.id == "X1" && p.is_placeholder()));
        assert!(stored.iter().any(|p| p.id == "X2" && p.has_deep_fields()));
        assert_eq!(store.references(), vec![LinkEdge::new("X2", "RU999")]);
    }

    #[tokio::test]
    async fn test_upstream_outage_aborts_before_any_write() {
        let platform = Arc::new(
            MockPlatform::new()
                .with_search(json!({ "total": 2, "hits": [search_hit("RU1", "А"), search_hit("RU2", "Б")] }))
                .failing(Endpoint::Document),
        );
        let store = Arc::new(MemoryStore::new());

        let err = aggregator(&platform, &store)
            .aggregate(&SearchRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ScraperError::UpstreamStatus { status: 503, .. }));
        assert_eq!(store.commits(), 0);
        assert_eq!(store.patent_count(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let platform = Arc::new(MockPlatform::new().with_delay(Duration::from_millis(10)));
        let store = Arc::new(MemoryStore::new());

        let batch: Vec<String> = (1..=6).map(|i| format!("RU{}", i)).collect();
        aggregator(&platform, &store).enrich(&batch).await.unwrap();

        assert_eq!(platform.calls(Endpoint::Document), 6);
        assert_eq!(platform.calls(Endpoint::Family), 6);
        assert!(platform.max_in_flight() <= 2, "max in flight {}", platform.max_in_flight());
    }

    #[tokio::test]
    async fn test_aggregate_skips_enriched_records() {
        let store = Arc::new(MemoryStore::new());
        store
            .persist(&AggregationResult {
                patents: vec![Patent {
                    claims_ru: Some("1. Насос".into()),
                    referred_from_ids: Some(vec!["RU9".into()]),
                    ..Patent::with_id("RU1")
                }],
                placeholders: vec!["RU9".into()],
                references: vec![LinkEdge::new("RU1", "RU9")],
                ..Default::default()
            })
            .await
            .unwrap();

        let platform = Arc::new(
            MockPlatform::new().with_search(json!({ "total": 2, "hits": [search_hit("RU1", "А"), search_hit("RU2", "Б")] })),
        );
        let page = aggregator(&platform, &store)
            .aggregate(&SearchRequest::default())
            .await
            .unwrap();

        assert_eq!(platform.requested(Endpoint::Document), vec!["RU2"]);
        assert_eq!(platform.requested(Endpoint::Family), vec!["RU2"]);
        assert_eq!(page.patents[0].claims_ru.as_deref(), Some("1. Насос"));
        assert_eq!(page.patents[0].referred_from_ids, Some(vec!["RU9".to_string()]));
        assert_eq!(page.patents[0].title_ru.as_deref(), Some("А"));
    }

    #[tokio::test]
    async fn test_similar_family_stores_canonical_edge() {
        let platform = Arc::new(MockPlatform::new().with_family(
            "RU001",
            json!({ "hits": [{ "id": "RU002", "similarity": 0.9, "similarity_norm": 0.8 }] }),
        ));
        let store = Arc::new(MemoryStore::new());

        let edges = aggregator(&platform, &store).similar_family("RU001\n").await.unwrap();
        let expected = FamilySimilarityEdge {
            first_id: "RU001".into(),
            second_id: "RU002".into(),
            referred_id: "RU002".into(),
            similarity: 0.9,
            similarity_norm: 0.8,
        };
        assert_eq!(edges, vec![expected.clone()]);
        assert_eq!(store.family_edges(), vec![expected]);
        assert_eq!(store.patent_count(), 2);
    }

    #[tokio::test]
    async fn test_search_similar_fetches_only_unknown_hits() {
        let store = Arc::new(MemoryStore::new());
        store
            .persist(&AggregationResult {
                patents: vec![Patent {
                    title_ru: Some("Известный".into()),
                    ..Patent::with_id("RU7")
                }],
                ..Default::default()
            })
            .await
            .unwrap();

        let platform = Arc::new(
            MockPlatform::new()
                .with_similar(json!({ "data": [
                    { "id": "RU7", "similarity": 0.9, "similarity_norm": 1.0 },
                    { "id": "RU8", "similarity": 0.5, "similarity_norm": 0.6 }
                ] }))
                .with_document("RU8", document("Описание", &[])),
        );

        let page = aggregator(&platform, &store)
            .search_similar(&SimilarSearchRequest::new("RU1"))
            .await
            .unwrap();

        assert_eq!(page.total, 100);
        assert_eq!(platform.requested(Endpoint::Document), vec!["RU8"]);
        assert_eq!(page.patents[0].title_ru.as_deref(), Some("Известный"));
        assert_eq!(page.patents[0].similarity, Some(0.9));
        assert_eq!(page.patents[1].description_ru.as_deref(), Some("Описание"));
        assert_eq!(page.patents[1].similarity_norm, Some(0.6));

        let edges = store.search_similarity_edges();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.search_patent_id == "RU1"));
    }

    #[tokio::test]
    async fn test_line_break_only_id_rejected_without_calls() {
        let platform = Arc::new(MockPlatform::new());
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(&platform, &store);

        for raw in ["\n", "\r\n"] {
            let err = aggregator.search_similar(&SimilarSearchRequest::new(raw)).await.unwrap_err();
            assert!(matches!(err, ScraperError::Validation(_)));
            let err = aggregator.similar_family(raw).await.unwrap_err();
            assert!(matches!(err, ScraperError::Validation(_)));
        }
        assert_eq!(platform.calls(Endpoint::SimilarSearch), 0);
        assert_eq!(platform.calls(Endpoint::Family), 0);
        assert_eq!(store.commits(), 0);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_without_calls() {
        let platform = Arc::new(MockPlatform::new());
        let store = Arc::new(MemoryStore::new());
        let request = SearchRequest {
            limit: 0,
            ..Default::default()
        };

        let err = aggregator(&platform, &store).aggregate(&request).await.unwrap_err();
        assert!(matches!(err, ScraperError::Validation(_)));
        assert_eq!(platform.calls(Endpoint::Search), 0);
    }
}
