//! Ordered write plan for one aggregation batch
//!
//! Both stores execute the same plan, step by step, inside one unit of work:
//! placeholders, patents, classifications, entities, references, prototypes,
//! family edges, search-similarity edges.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::domain::{
    AggregationResult, ClassificationKind, EntityKind, FamilySimilarityEdge, Lang, LinkEdge, Patent,
    SearchSimilarityEdge,
};

/// Codes of one classification scheme attached to patents
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationBatch {
    pub kind: ClassificationKind,
    /// patent id -> codes
    pub codes_by_patent: BTreeMap<String, BTreeSet<String>>,
}

impl ClassificationBatch {
    pub fn table(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn distinct_codes(&self) -> Vec<String> {
        let codes: BTreeSet<&String> = self.codes_by_patent.values().flatten().collect();
        codes.into_iter().cloned().collect()
    }

    pub fn links(&self) -> Vec<(String, String)> {
        self.codes_by_patent
            .iter()
            .flat_map(|(patent_id, codes)| codes.iter().map(move |code| (patent_id.clone(), code.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.codes_by_patent.is_empty()
    }
}

/// Entity names of one (type, language) pair attached to patents
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBatch {
    pub kind: EntityKind,
    pub lang: Lang,
    /// patent id -> names
    pub names_by_patent: BTreeMap<String, BTreeSet<String>>,
}

impl EntityBatch {
    /// Entity table, e.g. `patentee_ru`
    pub fn table(&self) -> String {
        format!("{}_{}", self.kind.as_str(), self.lang.as_str())
    }

    /// Join table, e.g. `patent_patentee_ru`
    pub fn join_table(&self) -> String {
        format!("patent_{}", self.table())
    }

    /// Join column referencing the entity, e.g. `patentee_id`
    pub fn join_column(&self) -> String {
        format!("{}_id", self.kind.as_str())
    }

    /// Union of all names in the batch, each once
    pub fn distinct_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.names_by_patent.values().flatten().collect();
        names.into_iter().cloned().collect()
    }

    /// Map (patent, name) pairs onto (patent, entity id) join rows.
    ///
    /// Names missing from `ids` are skipped; callers resolve the full
    /// distinct set first so this only happens on a concurrent delete.
    pub fn resolve_links(&self, ids: &HashMap<String, i32>) -> Vec<(String, i32)> {
        self.names_by_patent
            .iter()
            .flat_map(|(patent_id, names)| {
                names
                    .iter()
                    .filter_map(move |name| ids.get(name).map(|id| (patent_id.clone(), *id)))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_patent.is_empty()
    }
}

/// Deduplicated, ordered writes for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct PersistPlan {
    pub placeholders: Vec<String>,
    pub patents: Vec<Patent>,
    pub classifications: Vec<ClassificationBatch>,
    pub entities: Vec<EntityBatch>,
    pub references: Vec<LinkEdge>,
    pub prototypes: Vec<LinkEdge>,
    pub family: Vec<FamilySimilarityEdge>,
    pub search_similarity: Vec<SearchSimilarityEdge>,
}

impl PersistPlan {
    pub fn build(batch: &AggregationResult) -> Self {
        let placeholders: Vec<String> = batch
            .placeholders
            .iter()
            .filter(|id| !id.is_empty())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // A multi-row upsert may not touch the same row twice
        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, Patent> = HashMap::new();
        for patent in &batch.patents {
            match merged.get_mut(&patent.id) {
                Some(existing) => existing.merge_from(patent.clone()),
                None => {
                    order.push(patent.id.clone());
                    merged.insert(patent.id.clone(), patent.clone());
                }
            }
        }
        let patents: Vec<Patent> = order.iter().filter_map(|id| merged.remove(id)).collect();

        let classifications = ClassificationKind::ALL
            .into_iter()
            .map(|kind| ClassificationBatch {
                kind,
                codes_by_patent: collect_names(&patents, |p| p.codes(kind)),
            })
            .collect();

        let mut entities = Vec::with_capacity(EntityKind::ALL.len() * Lang::ALL.len());
        for kind in EntityKind::ALL {
            for lang in Lang::ALL {
                entities.push(EntityBatch {
                    kind,
                    lang,
                    names_by_patent: collect_names(&patents, |p| p.entity_names(kind, lang)),
                });
            }
        }

        let mut family: BTreeMap<(String, String), FamilySimilarityEdge> = BTreeMap::new();
        for edge in &batch.family {
            family.insert(edge.key(), edge.clone());
        }

        let mut search_similarity: BTreeMap<(String, String), SearchSimilarityEdge> = BTreeMap::new();
        for edge in &batch.search_similarity {
            search_similarity.insert(
                (edge.search_patent_id.clone(), edge.found_patent_id.clone()),
                edge.clone(),
            );
        }

        Self {
            placeholders,
            patents,
            classifications,
            entities,
            references: dedup_links(&batch.references),
            prototypes: dedup_links(&batch.prototypes),
            family: family.into_values().collect(),
            search_similarity: search_similarity.into_values().collect(),
        }
    }

    /// Row counts per write category, for metrics
    pub fn row_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("placeholders", self.placeholders.len()),
            ("patents", self.patents.len()),
            (
                "classifications",
                self.classifications.iter().map(|c| c.links().len()).sum(),
            ),
            (
                "entities",
                self.entities
                    .iter()
                    .map(|e| e.names_by_patent.values().map(BTreeSet::len).sum::<usize>())
                    .sum(),
            ),
            ("references", self.references.len()),
            ("prototypes", self.prototypes.len()),
            ("family", self.family.len()),
            ("search_similarity", self.search_similarity.len()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty()
            && self.patents.is_empty()
            && self.references.is_empty()
            && self.prototypes.is_empty()
            && self.family.is_empty()
            && self.search_similarity.is_empty()
    }
}

fn collect_names<'a, F>(patents: &'a [Patent], field: F) -> BTreeMap<String, BTreeSet<String>>
where
    F: Fn(&'a Patent) -> Option<&'a [String]>,
{
    let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for patent in patents {
        let names: BTreeSet<String> = field(patent)
            .unwrap_or_default()
            .iter()
            .filter(|n| !n.is_empty())
            .cloned()
            .collect();
        if !names.is_empty() {
            out.entry(patent.id.clone()).or_default().extend(names);
        }
    }
    out
}

fn dedup_links(edges: &[LinkEdge]) -> Vec<LinkEdge> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|edge| seen.insert((*edge).clone()))
        .cloned()
        .collect()
}
