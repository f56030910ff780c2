//! Identifier and text normalization

use chrono::NaiveDate;
use regex_lite::Regex;
use std::sync::OnceLock;

/// Canonical form of an upstream patent identifier.
///
/// Upstream occasionally embeds line breaks in otherwise valid identifiers.
pub fn normalize_id(raw: &str) -> String {
    raw.replace(['\n', '\r'], "")
}

/// Normalize a batch of identifiers, dropping blanks and repeats
pub fn normalize_ids<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::with_capacity(raw.len());
    for id in raw {
        let id = normalize_id(id.as_ref());
        if !id.trim().is_empty() && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("static tag pattern"))
}

/// Remove inline markup, keeping the enclosed text.
/// Empty results are treated as absent.
pub fn strip_tags(text: &str) -> Option<String> {
    let stripped = tag_pattern().replace_all(text, "");
    non_empty(stripped.trim())
}

/// `Some` for non-blank text
pub fn non_empty(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Upstream dates are `YYYY.MM.DD`; anything unparsable becomes `None`
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y.%m.%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("RU123\n_20230101"), "RU123_20230101");
        assert_eq!(normalize_id("RU123_20230101\r\n"), "RU123_20230101");
        assert_eq!(normalize_id(""), "");
        assert_eq!(normalize_id("RU123_20230101"), "RU123_20230101");
    }

    #[test]
    fn test_normalize_ids() {
        assert_eq!(normalize_ids(&["RU1\n", "RU1", "", "RU2"]), vec!["RU1", "RU2"]);
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(
            strip_tags("<p>Насос <b>центробежный</b></p>").as_deref(),
            Some("Насос центробежный")
        );
        assert_eq!(strip_tags("<br/>"), None);
        assert_eq!(strip_tags("1 < 2"), Some("1 < 2".to_string()));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2023.01.01"), NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(parse_date("2023-01-01"), None);
        assert_eq!(parse_date(""), None);
    }
}
