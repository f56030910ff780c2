//! Missing-info selection
//!
//! A record with any claims or description text counts as enriched and is
//! never refetched. Records without a persisted row count as missing.

use patentgraph_common::Patent;
use std::collections::{HashMap, HashSet};

/// Identifiers among `ids` that still need a detail fetch, in input order
/// and without duplicates
pub fn missing_ids(ids: &[String], persisted: &[Patent]) -> Vec<String> {
    let enriched: HashMap<&str, bool> = persisted
        .iter()
        .map(|p| (p.id.as_str(), p.has_deep_fields()))
        .collect();

    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter(|id| !enriched.get(id.as_str()).copied().unwrap_or(false))
        .cloned()
        .collect()
}
