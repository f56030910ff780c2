//! Domain model for the aggregation pipeline

pub mod edges;
pub mod patent;
pub mod request;

pub use edges::{edge_key, FamilySimilarityEdge, LinkEdge, SearchSimilarityEdge};
pub use patent::{ClassificationKind, EntityKind, Lang, Patent, Summary, SummaryCategory, TextKind};
pub use request::{Dataset, SearchPage, SearchRequest, SimilarSearchRequest, SortOrder, EXPORT_COLUMNS};

use serde::{Deserialize, Serialize};

/// Everything one aggregation batch wants to write
///
/// Handed to a [`crate::db::PatentStore`] which commits it atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Reconciled records, full upsert with coalescing
    pub patents: Vec<Patent>,
    /// Identifiers that only need to exist
    pub placeholders: Vec<String>,
    pub references: Vec<LinkEdge>,
    pub prototypes: Vec<LinkEdge>,
    pub family: Vec<FamilySimilarityEdge>,
    pub search_similarity: Vec<SearchSimilarityEdge>,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.patents.is_empty()
            && self.placeholders.is_empty()
            && self.references.is_empty()
            && self.prototypes.is_empty()
            && self.family.is_empty()
            && self.search_similarity.is_empty()
    }
}
