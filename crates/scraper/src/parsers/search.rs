//! Full-text search results

use patentgraph_common::domain::{SearchPage, SearchRequest};
use patentgraph_common::Patent;
use serde::Deserialize;
use tracing::instrument;

use super::{decode, Biblio, Common};
use crate::client::SearchPlatform;
use crate::errors::ScraperError;
use crate::normalize::{normalize_id, strip_tags};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    total: Option<u64>,
    hits: Option<Vec<Hit>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Hit {
    id: Option<String>,
    snippet: Option<Snippet>,
    common: Option<Common>,
    biblio: Option<Biblio>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Snippet {
    description: Option<String>,
}

/// Parse a search response into a page of shallow records.
///
/// Hits without an identifier are dropped; an undecodable body is an empty page.
pub fn parse_search(body: &[u8]) -> SearchPage {
    let Some(response) = decode::<SearchResponse>("search", "", body) else {
        return SearchPage::default();
    };

    let patents = response
        .hits
        .into_iter()
        .flatten()
        .filter_map(|hit| {
            let id = normalize_id(hit.id.as_deref()?);
            if id.is_empty() {
                return None;
            }
            let mut patent = Patent::with_id(id);
            patent.snippet_ru = hit.snippet.and_then(|s| s.description).as_deref().and_then(strip_tags);
            if let Some(common) = hit.common {
                common.apply(&mut patent);
            }
            if let Some(biblio) = hit.biblio {
                biblio.apply(&mut patent);
            }
            Some(patent)
        })
        .collect();

    SearchPage {
        total: response.total.unwrap_or_default(),
        patents,
    }
}

#[instrument(skip(platform, request), fields(limit = request.limit, offset = request.offset))]
pub async fn fetch_search(
    platform: &dyn SearchPlatform,
    request: &SearchRequest,
    preferred_lang: &str,
) -> Result<SearchPage, ScraperError> {
    let body = platform.search(&request.search_body(preferred_lang)).await?;
    Ok(parse_search(&body))
}
