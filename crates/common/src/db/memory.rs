//! In-process patent store
//!
//! Applies the same [`PersistPlan`] as the Postgres repository, with the same
//! coalescing upserts, unique names and reference checks. A batch is applied
//! to a copy of the state which replaces the live state only on success.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::db::plan::PersistPlan;
use crate::db::store::{PatentStore, SummarySource};
use crate::domain::{
    AggregationResult, ClassificationKind, EntityKind, FamilySimilarityEdge, Lang, LinkEdge, Patent,
    SearchSimilarityEdge, Summary, SummaryCategory,
};
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Default)]
struct EntityTable {
    next_id: i32,
    ids: BTreeMap<String, i32>,
}

impl EntityTable {
    fn insert_or_ignore(&mut self, name: &str) {
        if !self.ids.contains_key(name) {
            self.next_id += 1;
            self.ids.insert(name.to_string(), self.next_id);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    /// Patent rows (scalar columns and summaries)
    patents: BTreeMap<String, Patent>,
    codes: HashMap<ClassificationKind, BTreeSet<String>>,
    code_links: HashMap<ClassificationKind, BTreeSet<(String, String)>>,
    entities: HashMap<(EntityKind, Lang), EntityTable>,
    entity_links: HashMap<(EntityKind, Lang), BTreeSet<(String, i32)>>,
    references: BTreeSet<LinkEdge>,
    prototypes: BTreeSet<LinkEdge>,
    family: BTreeMap<(String, String), FamilySimilarityEdge>,
    search_similarity: BTreeMap<(String, String), SearchSimilarityEdge>,
}

impl State {
    fn require(&self, id: &str, what: &str) -> Result<()> {
        if self.patents.contains_key(id) {
            Ok(())
        } else {
            Err(AppError::Integrity {
                message: format!("{} references missing patent {}", what, id),
            })
        }
    }

    fn apply(&mut self, plan: &PersistPlan) -> Result<()> {
        for id in &plan.placeholders {
            self.patents
                .entry(id.clone())
                .or_insert_with(|| Patent::with_id(id.clone()));
        }

        for patent in &plan.patents {
            let row = self
                .patents
                .entry(patent.id.clone())
                .or_insert_with(|| Patent::with_id(patent.id.clone()));
            row.merge_from(scalar_columns(patent));
        }

        for batch in &plan.classifications {
            let codes = self.codes.entry(batch.kind).or_default();
            codes.extend(batch.distinct_codes());
            for (patent_id, code) in batch.links() {
                self.require(&patent_id, batch.table())?;
                self.code_links.entry(batch.kind).or_default().insert((patent_id, code));
            }
        }

        for batch in &plan.entities {
            let key = (batch.kind, batch.lang);
            let table = self.entities.entry(key).or_default();
            for name in batch.distinct_names() {
                table.insert_or_ignore(&name);
            }
            let ids: HashMap<String, i32> = table.ids.clone().into_iter().collect();
            for (patent_id, entity_id) in batch.resolve_links(&ids) {
                self.require(&patent_id, &batch.join_table())?;
                self.entity_links.entry(key).or_default().insert((patent_id, entity_id));
            }
        }

        for edge in &plan.references {
            self.require(&edge.source_id, "patent_referred_from")?;
            self.require(&edge.referred_id, "patent_referred_from")?;
            self.references.insert(edge.clone());
        }

        for edge in &plan.prototypes {
            self.require(&edge.source_id, "patent_prototype_docs")?;
            self.require(&edge.referred_id, "patent_prototype_docs")?;
            self.prototypes.insert(edge.clone());
        }

        for edge in &plan.family {
            if edge.first_id >= edge.second_id {
                return Err(AppError::Integrity {
                    message: format!("family edge {} -> {} is not ordered", edge.first_id, edge.second_id),
                });
            }
            self.require(&edge.first_id, "patent_family_similarity")?;
            self.require(&edge.second_id, "patent_family_similarity")?;
            self.require(&edge.referred_id, "patent_family_similarity")?;
            self.family.insert(edge.key(), edge.clone());
        }

        for edge in &plan.search_similarity {
            self.require(&edge.search_patent_id, "patent_similarity")?;
            self.require(&edge.found_patent_id, "patent_similarity")?;
            self.search_similarity.insert(
                (edge.search_patent_id.clone(), edge.found_patent_id.clone()),
                edge.clone(),
            );
        }

        Ok(())
    }

    /// Row plus its joined classifications, entities and links
    fn assemble(&self, id: &str) -> Option<Patent> {
        let mut patent = self.patents.get(id)?.clone();

        for kind in ClassificationKind::ALL {
            let codes: Vec<String> = self
                .code_links
                .get(&kind)
                .into_iter()
                .flatten()
                .filter(|(patent_id, _)| patent_id == id)
                .map(|(_, code)| code.clone())
                .collect();
            if !codes.is_empty() {
                *patent.codes_mut(kind) = Some(codes);
            }
        }

        for kind in EntityKind::ALL {
            for lang in Lang::ALL {
                let Some(table) = self.entities.get(&(kind, lang)) else {
                    continue;
                };
                let linked: BTreeSet<i32> = self
                    .entity_links
                    .get(&(kind, lang))
                    .into_iter()
                    .flatten()
                    .filter(|(patent_id, _)| patent_id == id)
                    .map(|(_, entity_id)| *entity_id)
                    .collect();
                let names: Vec<String> = table
                    .ids
                    .iter()
                    .filter(|(_, entity_id)| linked.contains(entity_id))
                    .map(|(name, _)| name.clone())
                    .collect();
                if !names.is_empty() {
                    *patent.entity_names_mut(kind, lang) = Some(names);
                }
            }
        }

        let referred: Vec<String> = self
            .references
            .iter()
            .filter(|e| e.source_id == id)
            .map(|e| e.referred_id.clone())
            .collect();
        if !referred.is_empty() {
            patent.referred_from_ids = Some(referred);
        }

        let prototypes: Vec<String> = self
            .prototypes
            .iter()
            .filter(|e| e.source_id == id)
            .map(|e| e.referred_id.clone())
            .collect();
        if !prototypes.is_empty() {
            patent.prototype_docs_ids = Some(prototypes);
        }

        Some(patent)
    }
}

/// The columns a patent row stores itself; everything else lives in joins
fn scalar_columns(patent: &Patent) -> Patent {
    Patent {
        ipc: None,
        cpc: None,
        patentees_ru: None,
        patentees_en: None,
        applicants_ru: None,
        applicants_en: None,
        inventors_ru: None,
        inventors_en: None,
        similarity: None,
        similarity_norm: None,
        referred_from_ids: None,
        prototype_docs_ids: None,
        ..patent.clone()
    }
}

/// [`PatentStore`] kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    commits: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| AppError::Internal {
            message: "memory store lock poisoned".to_string(),
        })
    }

    /// Number of committed batches
    pub fn commits(&self) -> usize {
        self.commits.lock().map(|c| *c).unwrap_or_default()
    }

    pub fn patent_count(&self) -> usize {
        self.lock().map(|s| s.patents.len()).unwrap_or_default()
    }

    pub fn references(&self) -> Vec<LinkEdge> {
        self.lock().map(|s| s.references.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn prototypes(&self) -> Vec<LinkEdge> {
        self.lock().map(|s| s.prototypes.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn family_edges(&self) -> Vec<FamilySimilarityEdge> {
        self.lock().map(|s| s.family.values().cloned().collect()).unwrap_or_default()
    }

    pub fn search_similarity_edges(&self) -> Vec<SearchSimilarityEdge> {
        self.lock()
            .map(|s| s.search_similarity.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Rows in one entity table
    pub fn entity_count(&self, kind: EntityKind, lang: Lang) -> usize {
        self.lock()
            .map(|s| s.entities.get(&(kind, lang)).map(|t| t.ids.len()).unwrap_or(0))
            .unwrap_or_default()
    }

    /// Rows in one patent-entity join table
    pub fn entity_link_count(&self, kind: EntityKind, lang: Lang) -> usize {
        self.lock()
            .map(|s| s.entity_links.get(&(kind, lang)).map(BTreeSet::len).unwrap_or(0))
            .unwrap_or_default()
    }
}

#[async_trait]
impl PatentStore for MemoryStore {
    async fn persist(&self, batch: &AggregationResult) -> Result<()> {
        let plan = PersistPlan::build(batch);
        let mut state = self.lock()?;

        let mut next = state.clone();
        next.apply(&plan)?;
        *state = next;

        if let Ok(mut commits) = self.commits.lock() {
            *commits += 1;
        }
        Ok(())
    }

    async fn deep_field_state(&self, ids: &[String]) -> Result<Vec<Patent>> {
        let state = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.patents.get(id))
            .map(|row| Patent {
                claims_ru: row.claims_ru.clone(),
                claims_en: row.claims_en.clone(),
                description_ru: row.description_ru.clone(),
                description_en: row.description_en.clone(),
                ..Patent::with_id(row.id.clone())
            })
            .collect())
    }

    async fn existing_patents(&self, ids: &[String]) -> Result<Vec<Patent>> {
        let state = self.lock()?;
        let unique: BTreeSet<&String> = ids.iter().collect();
        Ok(unique.into_iter().filter_map(|id| state.assemble(id)).collect())
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(ids.iter().filter(|id| state.patents.contains_key(*id)).cloned().collect())
    }

    async fn summary_source(&self, id: &str, category: SummaryCategory) -> Result<SummarySource> {
        let state = self.lock()?;
        let row = state
            .patents
            .get(id)
            .ok_or_else(|| AppError::PatentNotFound { id: id.to_string() })?;
        Ok(SummarySource {
            text: row.summary_source_text(category),
            summary: row.summaries.get(&category).cloned().unwrap_or_default(),
        })
    }

    async fn save_summary(&self, id: &str, category: SummaryCategory, summary: &Summary) -> Result<()> {
        let mut state = self.lock()?;
        let row = state
            .patents
            .get_mut(id)
            .ok_or_else(|| AppError::PatentNotFound { id: id.to_string() })?;
        row.summaries.insert(category, summary.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
