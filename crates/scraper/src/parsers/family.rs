//! Simple-family similarity hits

use patentgraph_common::domain::FamilySimilarityEdge;
use serde::Deserialize;
use tracing::{instrument, warn};

use super::decode;
use crate::client::SearchPlatform;
use crate::errors::ScraperError;
use crate::normalize::normalize_id;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FamilyResponse {
    hits: Option<Vec<FamilyHit>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FamilyHit {
    id: Option<String>,
    similarity: Option<f64>,
    similarity_norm: Option<f64>,
}

/// Parse family hits for `id` into canonical edges.
///
/// Each edge's `referred_id` is the found identifier. Hits without an
/// identifier or scores are skipped; an undecodable body yields no edges.
pub fn parse_family(id: &str, body: &[u8]) -> Vec<FamilySimilarityEdge> {
    let Some(response) = decode::<FamilyResponse>("family", id, body) else {
        return Vec::new();
    };

    response
        .hits
        .into_iter()
        .flatten()
        .filter_map(|hit| {
            let found = normalize_id(hit.id.as_deref()?);
            if found.is_empty() {
                return None;
            }
            let (Some(similarity), Some(similarity_norm)) = (hit.similarity, hit.similarity_norm) else {
                warn!(patent_id = id, found_id = %found, "Family hit without scores, skipping");
                return None;
            };
            FamilySimilarityEdge::canonical(id, &found, similarity, similarity_norm)
        })
        .collect()
}

#[instrument(skip(platform))]
pub async fn fetch_family(platform: &dyn SearchPlatform, id: &str) -> Result<Vec<FamilySimilarityEdge>, ScraperError> {
    let body = platform.similar_family(id).await?;
    Ok(parse_family(id, &body))
}
