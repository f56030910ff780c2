//! Relationship edges between patents

use serde::{Deserialize, Serialize};

/// Directed patent-to-patent link (reference or prototype document)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkEdge {
    pub source_id: String,
    pub referred_id: String,
}

impl LinkEdge {
    pub fn new(source_id: impl Into<String>, referred_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            referred_id: referred_id.into(),
        }
    }
}

/// Undirected family-similarity relation stored with ordered endpoints
///
/// `first_id < second_id` always holds for values built with
/// [`FamilySimilarityEdge::canonical`], so a patent never pairs with itself.
/// `referred_id` remembers which side was the hit of the originating query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySimilarityEdge {
    pub first_id: String,
    pub second_id: String,
    pub referred_id: String,
    pub similarity: f64,
    pub similarity_norm: f64,
}

impl FamilySimilarityEdge {
    /// Build the edge for a hit `found_id` returned when querying `query_id`.
    /// `None` when the hit is the queried patent itself.
    pub fn canonical(query_id: &str, found_id: &str, similarity: f64, similarity_norm: f64) -> Option<Self> {
        if query_id == found_id {
            return None;
        }
        let (first_id, second_id) = edge_key(query_id, found_id);
        Some(Self {
            first_id,
            second_id,
            referred_id: found_id.to_string(),
            similarity,
            similarity_norm,
        })
    }

    /// Storage key of the unordered pair
    pub fn key(&self) -> (String, String) {
        edge_key(&self.first_id, &self.second_id)
    }
}

/// Lexicographically ordered endpoint pair
pub fn edge_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Query-specific similarity hit: search patent -> found patent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSimilarityEdge {
    pub search_patent_id: String,
    pub found_patent_id: String,
    pub similarity: Option<f64>,
    pub similarity_norm: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_key_is_symmetric() {
        let pairs = [("RU001", "RU002"), ("RU2", "RU10"), ("SU1", "RU1"), ("X", "X")];
        for (x, y) in pairs {
            assert_eq!(edge_key(x, y), edge_key(y, x));
            let (first, second) = edge_key(x, y);
            assert!(first <= second);
        }
    }

    #[test]
    fn test_canonical_family_edge() {
        let edge = FamilySimilarityEdge::canonical("RU001", "RU002", 0.9, 0.8).unwrap();
        assert_eq!(edge.first_id, "RU001");
        assert_eq!(edge.second_id, "RU002");
        assert_eq!(edge.referred_id, "RU002");

        let reversed = FamilySimilarityEdge::canonical("RU002", "RU001", 0.9, 0.8).unwrap();
        assert_eq!(reversed.key(), edge.key());
        assert_eq!(reversed.referred_id, "RU001");
        assert!(edge.first_id < edge.second_id);
    }

    #[test]
    fn test_self_pair_has_no_edge() {
        assert!(FamilySimilarityEdge::canonical("RU001", "RU001", 1.0, 1.0).is_none());
    }
}
