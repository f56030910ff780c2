//! Edge extraction
//!
//! Turns reconciled records and family hits into an [`AggregationResult`]:
//! reference and prototype edges from each record's link lists, and an
//! identifier-only placeholder for every edge target so foreign keys hold.

use patentgraph_common::domain::{AggregationResult, FamilySimilarityEdge, LinkEdge};
use patentgraph_common::Patent;

/// Build the write batch for `patents` and `family`
pub fn extract(patents: Vec<Patent>, family: Vec<FamilySimilarityEdge>) -> AggregationResult {
    let mut batch = AggregationResult::default();

    for patent in &patents {
        for target in patent.referred_from_ids.iter().flatten() {
            batch.references.push(LinkEdge::new(&patent.id, target));
            batch.placeholders.push(target.clone());
        }
        for target in patent.prototype_docs_ids.iter().flatten() {
            batch.prototypes.push(LinkEdge::new(&patent.id, target));
            batch.placeholders.push(target.clone());
        }
    }

    batch
        .placeholders
        .extend(family.iter().map(|edge| edge.referred_id.clone()));

    batch.patents = patents;
    batch.family = family;
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_and_prototype_edges() {
        let patents = vec![
            Patent {
                referred_from_ids: Some(vec!["RU999".into(), "RU998".into()]),
                prototype_docs_ids: Some(vec!["SU1".into()]),
                ..Patent::with_id("RU123_20230101")
            },
            Patent::with_id("RU124_20230102"),
        ];

        let batch = extract(patents, vec![]);
        assert_eq!(
            batch.references,
            vec![
                LinkEdge::new("RU123_20230101", "RU999"),
                LinkEdge::new("RU123_20230101", "RU998"),
            ]
        );
        assert_eq!(batch.prototypes, vec![LinkEdge::new("RU123_20230101", "SU1")]);
        assert_eq!(batch.placeholders, vec!["RU999", "RU998", "SU1"]);
        assert_eq!(batch.patents.len(), 2);
    }

    #[test]
    fn test_family_targets_get_placeholders() {
        let family = vec![
            FamilySimilarityEdge::canonical("RU001", "RU002", 0.9, 0.8).unwrap(),
            FamilySimilarityEdge::canonical("RU003", "RU000", 0.5, 0.4).unwrap(),
        ];

        let batch = extract(vec![], family.clone());
        assert_eq!(batch.placeholders, vec!["RU002", "RU000"]);
        assert_eq!(batch.family, family);
        assert!(batch.references.is_empty());
    }
}
