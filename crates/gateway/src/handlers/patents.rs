//! Patent record handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use patentgraph_common::{
    db::SummarySource,
    domain::{Summary, SummaryCategory},
    errors::{AppError, Result},
    Patent,
};

/// Identifier batch for enrichment and lookups
#[derive(Debug, Deserialize, Validate)]
pub struct IdsRequest {
    #[validate(length(min = 1, max = 1000))]
    pub ids: Vec<String>,
}

#[derive(Serialize)]
pub struct EnrichResponse {
    pub requested: usize,
    pub enriched: usize,
}

fn validated(request: &IdsRequest) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("ids".to_string()),
    })
}

fn category(raw: &str) -> Result<SummaryCategory> {
    raw.parse().map_err(|message| AppError::Validation {
        message,
        field: Some("category".to_string()),
    })
}

/// Fetch detail and family data for records that lack it
pub async fn enrich(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> Result<Json<EnrichResponse>> {
    validated(&request)?;
    let enriched = state.aggregator.enrich(&request.ids).await?;

    Ok(Json(EnrichResponse {
        requested: request.ids.len(),
        enriched,
    }))
}

/// Persisted records for a batch of identifiers
pub async fn existing_patents(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> Result<Json<Vec<Patent>>> {
    validated(&request)?;
    let patents = state.aggregator.existing_records(&request.ids).await?;
    Ok(Json(patents))
}

/// Source text and current summary of one category
pub async fn get_summary(
    State(state): State<AppState>,
    Path((id, raw_category)): Path<(String, String)>,
) -> Result<Json<SummarySource>> {
    let category = category(&raw_category)?;
    let source = state.store.summary_source(&id, category).await?;
    Ok(Json(source))
}

/// Overwrite the summary of one category
pub async fn put_summary(
    State(state): State<AppState>,
    Path((id, raw_category)): Path<(String, String)>,
    Json(summary): Json<Summary>,
) -> Result<StatusCode> {
    let category = category(&raw_category)?;
    state.store.save_summary(&id, category, &summary).await?;

    tracing::info!(patent_id = %id, category = %category, "Summary saved");
    Ok(StatusCode::NO_CONTENT)
}
