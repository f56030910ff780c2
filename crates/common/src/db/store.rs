//! Storage seam used by the aggregation pipeline

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AggregationResult, Patent, Summary, SummaryCategory};
use crate::errors::Result;

/// Source text of a summary category and what is currently stored for it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummarySource {
    pub text: Option<String>,
    pub summary: Summary,
}

/// Patent persistence
///
/// Implementations must commit [`PatentStore::persist`] atomically: either
/// every write of the batch becomes visible or none does.
#[async_trait]
pub trait PatentStore: Send + Sync {
    /// Commit one aggregation batch in a single transaction
    async fn persist(&self, batch: &AggregationResult) -> Result<()>;

    /// Claims/description state of the persisted rows among `ids`.
    /// Identifiers without a row are absent from the result.
    async fn deep_field_state(&self, ids: &[String]) -> Result<Vec<Patent>>;

    /// Full records (with classifications, entities and links) for `ids`
    async fn existing_patents(&self, ids: &[String]) -> Result<Vec<Patent>>;

    /// Which of `ids` already have a row
    async fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>>;

    async fn summary_source(&self, id: &str, category: SummaryCategory) -> Result<SummarySource>;

    /// Overwrite the title/body of one summary category
    async fn save_summary(&self, id: &str, category: SummaryCategory, summary: &Summary) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
