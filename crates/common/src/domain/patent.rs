//! Canonical patent record
//!
//! Every upstream source produces a partially-filled [`Patent`] (a fragment).
//! Fragments for the same identifier are reconciled with [`Patent::merge_from`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Text language of a bilingual field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ru,
    En,
}

impl Lang {
    pub const ALL: [Lang; 2] = [Lang::Ru, Lang::En];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Ru => "ru",
            Lang::En => "en",
        }
    }
}

/// Long-text field categories carried in both languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    Snippet,
    Abstract,
    Claims,
    Description,
}

impl TextKind {
    pub const ALL: [TextKind; 4] = [
        TextKind::Snippet,
        TextKind::Abstract,
        TextKind::Claims,
        TextKind::Description,
    ];

    /// Claims and description mark a record as enriched
    pub const DEEP: [TextKind; 2] = [TextKind::Claims, TextKind::Description];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextKind::Snippet => "snippet",
            TextKind::Abstract => "abstract",
            TextKind::Claims => "claims",
            TextKind::Description => "description",
        }
    }
}

/// Named-entity roles attached to a patent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Patentee,
    Applicant,
    Inventor,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Patentee, EntityKind::Applicant, EntityKind::Inventor];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Patentee => "patentee",
            EntityKind::Applicant => "applicant",
            EntityKind::Inventor => "inventor",
        }
    }
}

/// Classification schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationKind {
    Ipc,
    Cpc,
}

impl ClassificationKind {
    pub const ALL: [ClassificationKind; 2] = [ClassificationKind::Ipc, ClassificationKind::Cpc];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationKind::Ipc => "ipc",
            ClassificationKind::Cpc => "cpc",
        }
    }
}

/// Field categories an external summarizer writes titles and bodies for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryCategory {
    Description,
    Snippet,
    Abstract,
    Claims,
    All,
}

impl SummaryCategory {
    pub const ALL: [SummaryCategory; 5] = [
        SummaryCategory::Description,
        SummaryCategory::Snippet,
        SummaryCategory::Abstract,
        SummaryCategory::Claims,
        SummaryCategory::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryCategory::Description => "description",
            SummaryCategory::Snippet => "snippet",
            SummaryCategory::Abstract => "abstract",
            SummaryCategory::Claims => "claims",
            SummaryCategory::All => "all",
        }
    }

    /// Source text fields, in the order they are joined for `All`
    pub fn sources(&self) -> &'static [TextKind] {
        match self {
            SummaryCategory::Description => &[TextKind::Description],
            SummaryCategory::Snippet => &[TextKind::Snippet],
            SummaryCategory::Abstract => &[TextKind::Abstract],
            SummaryCategory::Claims => &[TextKind::Claims],
            SummaryCategory::All => &[
                TextKind::Description,
                TextKind::Snippet,
                TextKind::Abstract,
                TextKind::Claims,
            ],
        }
    }
}

impl fmt::Display for SummaryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SummaryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SummaryCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown summary category: {}", s))
    }
}

/// Generated title/body pair (Russian)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub title: Option<String>,
    pub body: Option<String>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none()
    }
}

/// Canonical patent record, or a fragment of one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_filing_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet_ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims_ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patentees_ru: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patentees_en: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicants_ru: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicants_en: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventors_ru: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventors_en: Option<Vec<String>>,
    /// Only meaningful inside a similarity-search result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_norm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_from_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype_docs_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summaries: BTreeMap<SummaryCategory, Summary>,
}

/// Take `incoming` when it holds a value, keep `current` otherwise
fn coalesce<T>(current: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

impl Patent {
    /// Identifier-only record (placeholder or degraded fragment)
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn text(&self, kind: TextKind, lang: Lang) -> Option<&str> {
        let field = match (kind, lang) {
            (TextKind::Snippet, Lang::Ru) => &self.snippet_ru,
            (TextKind::Snippet, Lang::En) => &self.snippet_en,
            (TextKind::Abstract, Lang::Ru) => &self.abstract_ru,
            (TextKind::Abstract, Lang::En) => &self.abstract_en,
            (TextKind::Claims, Lang::Ru) => &self.claims_ru,
            (TextKind::Claims, Lang::En) => &self.claims_en,
            (TextKind::Description, Lang::Ru) => &self.description_ru,
            (TextKind::Description, Lang::En) => &self.description_en,
        };
        field.as_deref()
    }

    pub fn text_mut(&mut self, kind: TextKind, lang: Lang) -> &mut Option<String> {
        match (kind, lang) {
            (TextKind::Snippet, Lang::Ru) => &mut self.snippet_ru,
            (TextKind::Snippet, Lang::En) => &mut self.snippet_en,
            (TextKind::Abstract, Lang::Ru) => &mut self.abstract_ru,
            (TextKind::Abstract, Lang::En) => &mut self.abstract_en,
            (TextKind::Claims, Lang::Ru) => &mut self.claims_ru,
            (TextKind::Claims, Lang::En) => &mut self.claims_en,
            (TextKind::Description, Lang::Ru) => &mut self.description_ru,
            (TextKind::Description, Lang::En) => &mut self.description_en,
        }
    }

    pub fn entity_names(&self, kind: EntityKind, lang: Lang) -> Option<&[String]> {
        let field = match (kind, lang) {
            (EntityKind::Patentee, Lang::Ru) => &self.patentees_ru,
            (EntityKind::Patentee, Lang::En) => &self.patentees_en,
            (EntityKind::Applicant, Lang::Ru) => &self.applicants_ru,
            (EntityKind::Applicant, Lang::En) => &self.applicants_en,
            (EntityKind::Inventor, Lang::Ru) => &self.inventors_ru,
            (EntityKind::Inventor, Lang::En) => &self.inventors_en,
        };
        field.as_deref()
    }

    pub fn entity_names_mut(&mut self, kind: EntityKind, lang: Lang) -> &mut Option<Vec<String>> {
        match (kind, lang) {
            (EntityKind::Patentee, Lang::Ru) => &mut self.patentees_ru,
            (EntityKind::Patentee, Lang::En) => &mut self.patentees_en,
            (EntityKind::Applicant, Lang::Ru) => &mut self.applicants_ru,
            (EntityKind::Applicant, Lang::En) => &mut self.applicants_en,
            (EntityKind::Inventor, Lang::Ru) => &mut self.inventors_ru,
            (EntityKind::Inventor, Lang::En) => &mut self.inventors_en,
        }
    }

    pub fn codes(&self, kind: ClassificationKind) -> Option<&[String]> {
        match kind {
            ClassificationKind::Ipc => self.ipc.as_deref(),
            ClassificationKind::Cpc => self.cpc.as_deref(),
        }
    }

    pub fn codes_mut(&mut self, kind: ClassificationKind) -> &mut Option<Vec<String>> {
        match kind {
            ClassificationKind::Ipc => &mut self.ipc,
            ClassificationKind::Cpc => &mut self.cpc,
        }
    }

    /// True when any claims or description text is present
    pub fn has_deep_fields(&self) -> bool {
        TextKind::DEEP.iter().any(|kind| {
            Lang::ALL
                .iter()
                .any(|lang| self.text(*kind, *lang).is_some_and(|t| !t.is_empty()))
        })
    }

    /// True when nothing beyond the identifier is known
    pub fn is_placeholder(&self) -> bool {
        *self == Patent::with_id(self.id.clone())
    }

    /// Reconcile `incoming` into `self`.
    ///
    /// Every optional field takes the incoming value when it is non-null and
    /// keeps the current one otherwise. The identifier is never touched, so
    /// callers must only merge fragments that share it.
    pub fn merge_from(&mut self, incoming: Patent) {
        debug_assert_eq!(self.id, incoming.id, "merging fragments of different patents");

        let Patent {
            id: _,
            title_ru,
            title_en,
            publication_date,
            application_number,
            application_filing_date,
            ipc,
            cpc,
            snippet_ru,
            snippet_en,
            abstract_ru,
            abstract_en,
            claims_ru,
            claims_en,
            description_ru,
            description_en,
            patentees_ru,
            patentees_en,
            applicants_ru,
            applicants_en,
            inventors_ru,
            inventors_en,
            similarity,
            similarity_norm,
            referred_from_ids,
            prototype_docs_ids,
            summaries,
        } = incoming;

        coalesce(&mut self.title_ru, title_ru);
        coalesce(&mut self.title_en, title_en);
        coalesce(&mut self.publication_date, publication_date);
        coalesce(&mut self.application_number, application_number);
        coalesce(&mut self.application_filing_date, application_filing_date);
        coalesce(&mut self.ipc, ipc);
        coalesce(&mut self.cpc, cpc);
        coalesce(&mut self.snippet_ru, snippet_ru);
        coalesce(&mut self.snippet_en, snippet_en);
        coalesce(&mut self.abstract_ru, abstract_ru);
        coalesce(&mut self.abstract_en, abstract_en);
        coalesce(&mut self.claims_ru, claims_ru);
        coalesce(&mut self.claims_en, claims_en);
        coalesce(&mut self.description_ru, description_ru);
        coalesce(&mut self.description_en, description_en);
        coalesce(&mut self.patentees_ru, patentees_ru);
        coalesce(&mut self.patentees_en, patentees_en);
        coalesce(&mut self.applicants_ru, applicants_ru);
        coalesce(&mut self.applicants_en, applicants_en);
        coalesce(&mut self.inventors_ru, inventors_ru);
        coalesce(&mut self.inventors_en, inventors_en);
        coalesce(&mut self.similarity, similarity);
        coalesce(&mut self.similarity_norm, similarity_norm);
        coalesce(&mut self.referred_from_ids, referred_from_ids);
        coalesce(&mut self.prototype_docs_ids, prototype_docs_ids);

        for (category, summary) in summaries {
            let slot = self.summaries.entry(category).or_default();
            coalesce(&mut slot.title, summary.title);
            coalesce(&mut slot.body, summary.body);
        }
    }

    /// Functional form of [`Patent::merge_from`]: `existing` may be absent
    pub fn merge(existing: Option<Patent>, incoming: Patent) -> Patent {
        match existing {
            Some(mut base) => {
                base.merge_from(incoming);
                base
            }
            None => incoming,
        }
    }

    /// Join the source texts of a summary category (ru)
    pub fn summary_source_text(&self, category: SummaryCategory) -> Option<String> {
        let parts: Vec<&str> = category
            .sources()
            .iter()
            .filter_map(|kind| self.text(*kind, Lang::Ru))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_fragment() -> Patent {
        Patent {
            title_ru: Some("Насос".into()),
            snippet_ru: Some("Насос для перекачки".into()),
            ipc: Some(vec!["F04B 1/00".into()]),
            ..Patent::with_id("RU123_20230101")
        }
    }

    fn export_fragment() -> Patent {
        Patent {
            abstract_ru: Some("Описание".into()),
            ..Patent::with_id("RU123_20230101")
        }
    }

    #[test]
    fn test_merge_fills_missing_fields() {
        let merged = Patent::merge(Some(search_fragment()), export_fragment());
        assert_eq!(merged.title_ru.as_deref(), Some("Насос"));
        assert_eq!(merged.abstract_ru.as_deref(), Some("Описание"));
        assert_eq!(merged.ipc, Some(vec!["F04B 1/00".to_string()]));
    }

    #[test]
    fn test_merge_never_overwrites_with_null() {
        let mut merged = search_fragment();
        merged.merge_from(Patent::with_id("RU123_20230101"));
        assert_eq!(merged, search_fragment());
    }

    #[test]
    fn test_later_source_wins_on_conflict() {
        let mut merged = search_fragment();
        merged.merge_from(Patent {
            title_ru: Some("Насос центробежный".into()),
            ..Patent::with_id("RU123_20230101")
        });
        assert_eq!(merged.title_ru.as_deref(), Some("Насос центробежный"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let fragments = [search_fragment(), export_fragment(), Patent::with_id("RU123_20230101")];
        for a in &fragments {
            for b in &fragments {
                let ab = Patent::merge(Some(a.clone()), b.clone());
                assert_eq!(Patent::merge(Some(ab.clone()), b.clone()), ab);
                assert_eq!(Patent::merge(Some(ab.clone()), ab.clone()), ab);
            }
        }
    }

    #[test]
    fn test_merge_with_no_existing() {
        let merged = Patent::merge(None, export_fragment());
        assert_eq!(merged, export_fragment());
    }

    #[test]
    fn test_summaries_merge_per_slot() {
        let mut base = Patent::with_id("RU1");
        base.summaries.insert(
            SummaryCategory::Claims,
            Summary { title: Some("Насос".into()), body: Some("Кратко".into()) },
        );
        let mut incoming = Patent::with_id("RU1");
        incoming.summaries.insert(
            SummaryCategory::Claims,
            Summary { title: None, body: Some("Новое".into()) },
        );
        base.merge_from(incoming);
        let slot = &base.summaries[&SummaryCategory::Claims];
        assert_eq!(slot.title.as_deref(), Some("Насос"));
        assert_eq!(slot.body.as_deref(), Some("Новое"));
    }

    #[test]
    fn test_deep_fields() {
        let mut patent = search_fragment();
        assert!(!patent.has_deep_fields());
        patent.description_en = Some(String::new());
        assert!(!patent.has_deep_fields());
        patent.claims_en = Some("1. A pump.".into());
        assert!(patent.has_deep_fields());
    }

    #[test]
    fn test_text_accessors_cover_all_fields() {
        let mut patent = Patent::with_id("RU1");
        for kind in TextKind::ALL {
            for lang in Lang::ALL {
                *patent.text_mut(kind, lang) = Some(format!("{}_{}", kind.as_str(), lang.as_str()));
            }
        }
        assert_eq!(patent.claims_en.as_deref(), Some("claims_en"));
        assert_eq!(patent.text(TextKind::Snippet, Lang::Ru), Some("snippet_ru"));
    }

    #[test]
    fn test_summary_source_text_all_joins_ru_fields() {
        let patent = Patent {
            description_ru: Some("Описание".into()),
            abstract_ru: Some("Реферат".into()),
            claims_en: Some("Claims".into()),
            ..Patent::with_id("RU1")
        };
        assert_eq!(
            patent.summary_source_text(SummaryCategory::All).as_deref(),
            Some("Описание Реферат")
        );
        assert_eq!(patent.summary_source_text(SummaryCategory::Claims), None);
    }

    #[test]
    fn test_summary_category_parsing() {
        assert_eq!("claims".parse::<SummaryCategory>(), Ok(SummaryCategory::Claims));
        assert!("title".parse::<SummaryCategory>().is_err());
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(Patent::with_id("RU999").is_placeholder());
        assert!(!search_fragment().is_placeholder());
    }
}
