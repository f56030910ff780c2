//! Spreadsheet export of a search
//!
//! The export carries the hit count in `B3` and one row per hit from row 9:
//! identity, publication date, title, application number, filing date and
//! abstract. Rows stop at the first blank row or after `limit` rows.

use patentgraph_common::domain::{SearchPage, SearchRequest};
use patentgraph_common::{metrics, Patent};
use tracing::{instrument, warn};

use super::xlsx::{read_first_sheet, Sheet};
use crate::client::SearchPlatform;
use crate::errors::ScraperError;
use crate::normalize::{non_empty, normalize_id, parse_date};

const TOTAL_CELL: &str = "B3";
const FIRST_ROW: u32 = 9;
const WIDTH: u32 = 6;

/// Record identifier from the identity and publication date columns:
/// spaces dropped from the identity, dots dropped from the date.
pub fn export_id(identity: &str, publication_date: &str) -> String {
    normalize_id(&format!(
        "{}_{}",
        identity.replace(' ', ""),
        publication_date.trim().replace('.', "")
    ))
}

/// Parse an xlsx export into a page of records carrying the Russian abstract.
///
/// A body that is not a readable workbook is an empty page.
pub fn parse_export(bytes: &[u8], limit: u32) -> SearchPage {
    match read_first_sheet(bytes) {
        Ok(sheet) => page_from_sheet(&sheet, limit),
        Err(e) => {
            warn!(parser = "export", bytes = bytes.len(), error = %e, "Unreadable export, degrading");
            metrics::record_degraded("export");
            SearchPage::default()
        }
    }
}

fn page_from_sheet(sheet: &Sheet, limit: u32) -> SearchPage {
    let total = sheet.get(TOTAL_CELL).map(parse_total).unwrap_or_default();

    let mut patents = Vec::new();
    for row in FIRST_ROW..FIRST_ROW.saturating_add(limit) {
        let cells = sheet.row(row, WIDTH);
        if cells.iter().all(Option::is_none) {
            break;
        }

        let (Some(identity), Some(pub_date)) = (cells[0], cells[1]) else {
            warn!(row, "Export row without identity or publication date, skipping");
            continue;
        };

        let mut patent = Patent::with_id(export_id(identity, pub_date));
        patent.publication_date = parse_date(pub_date);
        patent.title_ru = cells[2].and_then(non_empty);
        patent.application_number = cells[3].and_then(non_empty);
        patent.application_filing_date = cells[4].and_then(parse_date);
        patent.abstract_ru = cells[5].and_then(non_empty);
        patents.push(patent);
    }

    SearchPage { total, patents }
}

/// Hit count, tolerating a float rendering or surrounding text.
/// Numbers that are not a whole non-negative count read as 0.
fn parse_total(raw: &str) -> u64 {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return n;
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 {
            return f as u64;
        }
        warn!(cell = TOTAL_CELL, value = raw, "Export total is not a count");
        return 0;
    }
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or_default()
}

#[instrument(skip(platform, request), fields(limit = request.limit, offset = request.offset))]
pub async fn fetch_export(
    platform: &dyn SearchPlatform,
    request: &SearchRequest,
    preferred_lang: &str,
) -> Result<SearchPage, ScraperError> {
    let body = platform.export(&request.export_body(preferred_lang)).await?;
    Ok(parse_export(&body, request.limit))
}
