//! Single-document detail record

use patentgraph_common::domain::TextKind;
use patentgraph_common::Patent;
use serde::Deserialize;
use tracing::instrument;

use super::{apply_text, decode, ref_ids, Biblio, Common, DocRef, LangText};
use crate::client::SearchPlatform;
use crate::errors::ScraperError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DocumentResponse {
    common: Option<Common>,
    biblio: Option<Biblio>,
    #[serde(rename = "abstract")]
    abstract_text: Option<LangText>,
    claims: Option<LangText>,
    description: Option<LangText>,
    referred_from: Option<Vec<DocRef>>,
    prototype_docs: Option<Vec<DocRef>>,
}

/// Parse a document body into a fragment for `id`.
///
/// The fragment always carries the requested identifier. An undecodable body
/// yields a fragment with only the identifier set.
pub fn parse_detail(id: &str, body: &[u8]) -> Patent {
    let mut patent = Patent::with_id(id);
    let Some(doc) = decode::<DocumentResponse>("detail", id, body) else {
        return patent;
    };

    if let Some(common) = doc.common {
        common.apply(&mut patent);
    }
    if let Some(biblio) = doc.biblio {
        biblio.apply(&mut patent);
    }
    apply_text(&mut patent, TextKind::Abstract, doc.abstract_text);
    apply_text(&mut patent, TextKind::Claims, doc.claims);
    apply_text(&mut patent, TextKind::Description, doc.description);
    patent.referred_from_ids = ref_ids(doc.referred_from);
    patent.prototype_docs_ids = ref_ids(doc.prototype_docs);
    patent
}

#[instrument(skip(platform))]
pub async fn fetch_detail(platform: &dyn SearchPlatform, id: &str) -> Result<Patent, ScraperError> {
    let body = platform.document(id).await?;
    Ok(parse_detail(id, &body))
}
