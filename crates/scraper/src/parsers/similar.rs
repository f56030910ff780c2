//! Thesaurus search-by-identifier results

use patentgraph_common::domain::{SearchPage, SimilarSearchRequest};
use patentgraph_common::Patent;
use serde::Deserialize;
use tracing::instrument;

use super::decode;
use crate::client::SearchPlatform;
use crate::errors::ScraperError;
use crate::normalize::normalize_id;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SimilarResponse {
    data: Option<Vec<SimilarHit>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SimilarHit {
    id: Option<String>,
    similarity: Option<f64>,
    similarity_norm: Option<f64>,
}

/// Parse similar-search hits into id-plus-score records.
///
/// The platform does not report a hit count, so a non-empty result reports
/// the requested `count` as its total.
pub fn parse_similar(body: &[u8], count: u32) -> SearchPage {
    let Some(response) = decode::<SimilarResponse>("similar", "", body) else {
        return SearchPage::default();
    };

    let patents: Vec<Patent> = response
        .data
        .into_iter()
        .flatten()
        .filter_map(|hit| {
            let id = normalize_id(hit.id.as_deref()?);
            if id.is_empty() {
                return None;
            }
            let mut patent = Patent::with_id(id);
            patent.similarity = hit.similarity;
            patent.similarity_norm = hit.similarity_norm;
            Some(patent)
        })
        .collect();

    let total = if patents.is_empty() { 0 } else { u64::from(count) };
    SearchPage { total, patents }
}

#[instrument(skip(platform, request), fields(id = %request.id, page = request.page()))]
pub async fn fetch_similar(
    platform: &dyn SearchPlatform,
    request: &SimilarSearchRequest,
) -> Result<SearchPage, ScraperError> {
    let body = platform
        .similar_search(&request.body(), request.page(), request.limit)
        .await?;
    Ok(parse_similar(&body, request.count))
}
