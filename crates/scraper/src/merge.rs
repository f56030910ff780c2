//! Fragment reconciliation across sources
//!
//! Application order is fixed: search first, then export, then detail. Later
//! sources win on conflicting non-null values, so the export abstract beats
//! the search snippet and detail text beats both.

use patentgraph_common::domain::{Lang, SearchPage, TextKind};
use patentgraph_common::Patent;
use std::collections::HashMap;

/// Merge fragments per identifier, keeping first-occurrence order
pub fn merge_fragments(fragments: impl IntoIterator<Item = Patent>) -> Vec<Patent> {
    let mut merged: Vec<Patent> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for fragment in fragments {
        match index.get(&fragment.id) {
            Some(&i) => merged[i].merge_from(fragment),
            None => {
                index.insert(fragment.id.clone(), merged.len());
                merged.push(fragment);
            }
        }
    }
    merged
}

/// Phase-1 reconciliation of the search page with its export.
///
/// Ranking follows the search page; export rows for identifiers the search
/// did not return are appended. The search total is kept unless it is zero.
pub fn reconcile_search(search: SearchPage, export: SearchPage) -> SearchPage {
    let total = if search.total > 0 { search.total } else { export.total };
    SearchPage {
        total,
        patents: merge_fragments(search.patents.into_iter().chain(export.patents)),
    }
}

/// Merge detail fragments into the working set.
///
/// Fragments for identifiers outside the working set are ignored.
pub fn apply_details(patents: &mut [Patent], details: Vec<Patent>) {
    let mut by_id: HashMap<String, Patent> = merge_fragments(details)
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    for patent in patents.iter_mut() {
        if let Some(detail) = by_id.remove(&patent.id) {
            patent.merge_from(detail);
        }
    }
}

/// Copy long text and link lists from a previously persisted record.
///
/// Used for identifiers that were not refetched: bibliographic fields stay as
/// the fresh search returned them.
pub fn apply_persisted(patent: &mut Patent, persisted: &Patent) {
    for kind in [TextKind::Abstract, TextKind::Claims, TextKind::Description] {
        for lang in Lang::ALL {
            if let Some(text) = persisted.text(kind, lang) {
                *patent.text_mut(kind, lang) = Some(text.to_string());
            }
        }
    }
    if persisted.referred_from_ids.is_some() {
        patent.referred_from_ids = persisted.referred_from_ids.clone();
    }
    if persisted.prototype_docs_ids.is_some() {
        patent.prototype_docs_ids = persisted.prototype_docs_ids.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(id: &str) -> Patent {
        Patent::with_id(id)
    }

    #[test]
    fn test_search_and_export_reconciled_by_id() {
        let search = SearchPage {
            total: 3,
            patents: vec![
                Patent {
                    title_ru: Some("Насос".into()),
                    snippet_ru: Some("фрагмент".into()),
                    ..fragment("RU123_20230101")
                },
                fragment("RU124_20230102"),
            ],
        };
        let export = SearchPage {
            total: 3,
            patents: vec![
                fragment("RU124_20230102"),
                Patent {
                    abstract_ru: Some("Описание".into()),
                    ..fragment("RU123_20230101")
                },
                fragment("RU125_20230103"),
            ],
        };

        let page = reconcile_search(search, export);
        let ids: Vec<&str> = page.patents.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["RU123_20230101", "RU124_20230102", "RU125_20230103"]);
        assert_eq!(page.patents[0].title_ru.as_deref(), Some("Насос"));
        assert_eq!(page.patents[0].abstract_ru.as_deref(), Some("Описание"));
        assert_eq!(page.patents[0].snippet_ru.as_deref(), Some("фрагмент"));
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_export_total_used_when_search_empty() {
        let export = SearchPage { total: 7, patents: vec![] };
        assert_eq!(reconcile_search(SearchPage::default(), export).total, 7);
    }

    #[test]
    fn test_detail_overrides_and_fills() {
        let mut patents = vec![Patent {
            abstract_ru: Some("из выгрузки".into()),
            title_ru: Some("Насос".into()),
            ..fragment("RU1")
        }];
        let details = vec![
            Patent {
                abstract_ru: Some("полный реферат".into()),
                claims_ru: Some("1. Насос".into()),
                ..fragment("RU1")
            },
            fragment("RU2"),
        ];

        apply_details(&mut patents, details);
        assert_eq!(patents.len(), 1);
        assert_eq!(patents[0].abstract_ru.as_deref(), Some("полный реферат"));
        assert_eq!(patents[0].claims_ru.as_deref(), Some("1. Насос"));
        assert_eq!(patents[0].title_ru.as_deref(), Some("Насос"));
    }

    #[test]
    fn test_degraded_detail_loses_nothing() {
        let original = Patent {
            title_ru: Some("Насос".into()),
            ..fragment("X1")
        };
        let mut patents = vec![original.clone()];
        apply_details(&mut patents, vec![fragment("X1")]);
        assert_eq!(patents[0], original);
    }

    #[test]
    fn test_persisted_text_and_links_applied() {
        let mut patent = Patent {
            title_ru: Some("Новое название".into()),
            ..fragment("RU1")
        };
        let persisted = Patent {
            title_ru: Some("Старое название".into()),
            description_ru: Some("Описание".into()),
            referred_from_ids: Some(vec!["RU9".into()]),
            ..fragment("RU1")
        };

        apply_persisted(&mut patent, &persisted);
        assert_eq!(patent.title_ru.as_deref(), Some("Новое название"));
        assert_eq!(patent.description_ru.as_deref(), Some("Описание"));
        assert_eq!(patent.referred_from_ids, Some(vec!["RU9".to_string()]));
    }
}
