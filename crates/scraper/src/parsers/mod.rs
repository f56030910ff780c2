//! Source parsers
//!
//! Each parser turns one upstream response shape into Patent fragments or
//! edges. Parsing is defensive: missing keys become `None`, and a body that
//! cannot be decoded at all degrades to an empty result instead of failing
//! the batch.

pub mod detail;
pub mod export;
pub mod family;
pub mod search;
pub mod similar;
pub mod xlsx;

pub use detail::{fetch_detail, parse_detail};
pub use export::{fetch_export, parse_export};
pub use family::{fetch_family, parse_family};
pub use search::{fetch_search, parse_search};
pub use similar::{fetch_similar, parse_similar};

use patentgraph_common::domain::{ClassificationKind, EntityKind, Lang, Patent, TextKind};
use patentgraph_common::metrics;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::normalize::{non_empty, normalize_id, parse_date, strip_tags};

/// Decode a JSON body, or log and count a degraded fragment
pub(crate) fn decode<T: DeserializeOwned>(parser: &'static str, patent_id: &str, body: &[u8]) -> Option<T> {
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(parser, patent_id, bytes = body.len(), error = %e, "Malformed upstream body, degrading");
            metrics::record_degraded(parser);
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Common {
    pub publication_date: Option<String>,
    pub application: Option<Application>,
    pub classification: Option<Classification>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Application {
    pub number: Option<String>,
    pub filing_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Classification {
    pub ipc: Option<Vec<Code>>,
    pub cpc: Option<Vec<Code>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Code {
    pub fullname: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Biblio {
    pub ru: Option<BiblioLang>,
    pub en: Option<BiblioLang>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct BiblioLang {
    pub title: Option<String>,
    pub patentee: Option<Vec<Named>>,
    pub applicant: Option<Vec<Named>>,
    pub inventor: Option<Vec<Named>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Named {
    pub name: Option<String>,
}

/// `{ "ru": ..., "en": ... }` text pair
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LangText {
    pub ru: Option<String>,
    pub en: Option<String>,
}

impl LangText {
    pub fn get(&self, lang: Lang) -> Option<&str> {
        match lang {
            Lang::Ru => self.ru.as_deref(),
            Lang::En => self.en.as_deref(),
        }
    }
}

/// `{ "id": ... }` document reference
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DocRef {
    pub id: Option<String>,
}

impl Common {
    pub fn apply(self, patent: &mut Patent) {
        patent.publication_date = self.publication_date.as_deref().and_then(parse_date);

        if let Some(application) = self.application {
            patent.application_number = application.number.as_deref().and_then(non_empty);
            patent.application_filing_date = application.filing_date.as_deref().and_then(parse_date);
        }

        if let Some(classification) = self.classification {
            *patent.codes_mut(ClassificationKind::Ipc) = codes(classification.ipc);
            *patent.codes_mut(ClassificationKind::Cpc) = codes(classification.cpc);
        }
    }
}

impl BiblioLang {
    fn names(&self, kind: EntityKind) -> Option<Vec<String>> {
        let list = match kind {
            EntityKind::Patentee => &self.patentee,
            EntityKind::Applicant => &self.applicant,
            EntityKind::Inventor => &self.inventor,
        };
        let names: Vec<String> = list
            .iter()
            .flatten()
            .filter_map(|n| n.name.as_deref().and_then(non_empty))
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }
}

impl Biblio {
    pub fn apply(self, patent: &mut Patent) {
        for (lang, biblio) in [(Lang::Ru, self.ru), (Lang::En, self.en)] {
            let Some(biblio) = biblio else {
                continue;
            };
            let title = biblio.title.as_deref().and_then(non_empty);
            match lang {
                Lang::Ru => patent.title_ru = title,
                Lang::En => patent.title_en = title,
            }
            for kind in EntityKind::ALL {
                *patent.entity_names_mut(kind, lang) = biblio.names(kind);
            }
        }
    }
}

fn codes(list: Option<Vec<Code>>) -> Option<Vec<String>> {
    let codes: Vec<String> = list
        .into_iter()
        .flatten()
        .filter_map(|c| c.fullname.as_deref().and_then(non_empty))
        .collect();
    if codes.is_empty() {
        None
    } else {
        Some(codes)
    }
}

/// Tag-stripped bilingual text into the matching fields
pub(crate) fn apply_text(patent: &mut Patent, kind: TextKind, text: Option<LangText>) {
    let Some(text) = text else {
        return;
    };
    for lang in Lang::ALL {
        *patent.text_mut(kind, lang) = text.get(lang).and_then(strip_tags);
    }
}

/// Normalized, non-empty, first-occurrence-ordered identifiers
pub(crate) fn ref_ids(refs: Option<Vec<DocRef>>) -> Option<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    for id in refs.into_iter().flatten().filter_map(|r| r.id) {
        let id = normalize_id(&id);
        if !id.is_empty() && !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_biblio_and_common_tolerate_nulls() {
        let common: Common = serde_json::from_value(json!({
            "publication_date": "2023.01.01",
            "application": null,
            "classification": { "ipc": [{ "fullname": "F04B 1/00" }, { "fullname": null }], "cpc": null }
        }))
        .unwrap();
        let biblio: Biblio = serde_json::from_value(json!({
            "ru": { "title": "Насос", "patentee": [{ "name": "ООО Ромашка" }], "inventor": [] },
            "en": null
        }))
        .unwrap();

        let mut patent = Patent::with_id("RU1");
        common.apply(&mut patent);
        biblio.apply(&mut patent);

        assert_eq!(patent.ipc, Some(vec!["F04B 1/00".to_string()]));
        assert_eq!(patent.cpc, None);
        assert_eq!(patent.title_ru.as_deref(), Some("Насос"));
        assert_eq!(patent.patentees_ru, Some(vec!["ООО Ромашка".to_string()]));
        assert_eq!(patent.inventors_ru, None);
        assert_eq!(patent.application_number, None);
    }

    #[test]
    fn test_ref_ids_normalized_and_deduplicated() {
        let refs = vec![
            DocRef { id: Some("RU999\n".into()) },
            DocRef { id: Some("RU999".into()) },
            DocRef { id: None },
            DocRef { id: Some(String::new()) },
        ];
        assert_eq!(ref_ids(Some(refs)), Some(vec!["RU999".to_string()]));
        assert_eq!(ref_ids(None), None);
    }
}
