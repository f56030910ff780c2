//! Search handlers

use axum::{
    extract::{Path, State},
    Json,
};
use patentgraph_common::domain::{FamilySimilarityEdge, SearchPage, SearchRequest, SimilarSearchRequest};
use patentgraph_common::errors::Result;
use std::time::Instant;
use tracing::info;

use crate::AppState;

/// Search, reconcile with the export, enrich missing records and persist
pub async fn search_full_info(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchPage>> {
    let start = Instant::now();
    let page = state.aggregator.aggregate(&request).await?;

    info!(
        total = page.total,
        returned = page.patents.len(),
        processing_time_ms = start.elapsed().as_millis() as u64,
        "Full-info search completed"
    );
    Ok(Json(page))
}

/// Thesaurus search by identifier with similarity scores
pub async fn search_similar(
    State(state): State<AppState>,
    Json(request): Json<SimilarSearchRequest>,
) -> Result<Json<SearchPage>> {
    let start = Instant::now();
    let page = state.aggregator.search_similar(&request).await?;

    info!(
        patent_id = %request.id,
        returned = page.patents.len(),
        processing_time_ms = start.elapsed().as_millis() as u64,
        "Similar search completed"
    );
    Ok(Json(page))
}

/// Simple-family similarity edges of one patent
pub async fn similar_family_simple(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FamilySimilarityEdge>>> {
    let edges = state.aggregator.similar_family(&id).await?;
    Ok(Json(edges))
}
