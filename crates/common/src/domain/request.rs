//! Search requests and the upstream query bodies built from them

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use validator::Validate;

use super::patent::Patent;

/// Result ordering supported by the search platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "relevance")]
    Relevance,
    #[serde(rename = "publication_date:desc")]
    PublicationDateDesc,
    #[serde(rename = "publication_date:asc")]
    PublicationDateAsc,
    #[serde(rename = "filing_date:desc")]
    FilingDateDesc,
    #[serde(rename = "filing_date:asc")]
    FilingDateAsc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Relevance => "relevance",
            SortOrder::PublicationDateDesc => "publication_date:desc",
            SortOrder::PublicationDateAsc => "publication_date:asc",
            SortOrder::FilingDateDesc => "filing_date:desc",
            SortOrder::FilingDateAsc => "filing_date:asc",
        }
    }
}

/// Document collections of the search platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Russia before 1994
    RuTill1994,
    /// Russia since 1994
    RuSince1994,
    /// CIS patent documents
    Cis,
    /// Russian industrial designs
    DsgnRu,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::RuTill1994 => "ru_till_1994",
            Dataset::RuSince1994 => "ru_since_1994",
            Dataset::Cis => "cis",
            Dataset::DsgnRu => "dsgn_ru",
        }
    }
}

fn default_datasets() -> Vec<Dataset> {
    vec![Dataset::RuTill1994, Dataset::RuSince1994]
}

fn default_limit() -> u32 {
    10
}

fn default_count() -> u32 {
    100
}

/// Columns requested from the spreadsheet export, in sheet order
pub const EXPORT_COLUMNS: [&str; 6] = [
    "identity",
    "publication_date",
    "title",
    "application.number",
    "application.filing_date",
    "abstract",
];

/// Free-text / author / date-range / dataset search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SearchRequest {
    /// Free-text query
    #[serde(default)]
    pub patent_description: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub sort: SortOrder,

    #[serde(default = "default_datasets", alias = "dataset")]
    #[validate(length(min = 1))]
    pub datasets: Vec<Dataset>,

    #[serde(default)]
    pub date_from: Option<NaiveDate>,

    #[serde(default)]
    pub date_to: Option<NaiveDate>,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub limit: u32,

    #[serde(default)]
    pub offset: u32,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            patent_description: None,
            author: None,
            sort: SortOrder::default(),
            datasets: default_datasets(),
            date_from: None,
            date_to: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl SearchRequest {
    /// Body of the `/search` call
    pub fn search_body(&self, preferred_lang: &str) -> Value {
        let mut body = Map::new();
        body.insert("limit".into(), json!(self.limit));
        body.insert("offset".into(), json!(self.offset));
        body.insert("pre_tag".into(), json!(""));
        body.insert("post_tag".into(), json!(""));
        body.insert("sort".into(), json!(self.sort.as_str()));
        body.insert(
            "datasets".into(),
            Value::Array(self.datasets.iter().map(|d| json!(d.as_str())).collect()),
        );
        // Field name is misspelled upstream
        body.insert("preffered_lang".into(), json!(preferred_lang));

        if let Some(filter) = self.filter() {
            body.insert("filter".into(), filter);
        }
        if let Some(query) = self.patent_description.as_deref().filter(|q| !q.is_empty()) {
            body.insert("qn".into(), json!(query));
        }

        Value::Object(body)
    }

    /// Body of the `/report` spreadsheet export for the same logical search
    pub fn export_body(&self, preferred_lang: &str) -> Value {
        let mut body = self.search_body(preferred_lang);
        if let Value::Object(map) = &mut body {
            map.insert("format".into(), json!("xlsx"));
            map.insert("fields".into(), json!(EXPORT_COLUMNS));
        }
        body
    }

    fn filter(&self) -> Option<Value> {
        let mut filter = Map::new();

        if self.date_from.is_some() || self.date_to.is_some() {
            let mut range = Map::new();
            if let Some(from) = self.date_from {
                range.insert("gte".into(), json!(from.format("%Y%m%d").to_string()));
            }
            if let Some(to) = self.date_to {
                range.insert("lte".into(), json!(to.format("%Y%m%d").to_string()));
            }
            filter.insert("date_published:search".into(), json!({ "range": range }));
        }

        if let Some(author) = self.author.as_deref().filter(|a| !a.is_empty()) {
            filter.insert("authors:search".into(), json!({ "search": author }));
        }

        if filter.is_empty() {
            None
        } else {
            Some(Value::Object(filter))
        }
    }
}

/// Thesaurus "search by identifier" request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SimilarSearchRequest {
    #[validate(length(min = 1))]
    pub id: String,

    /// Total hits the platform should consider
    #[serde(default = "default_count")]
    #[validate(range(min = 1))]
    pub count: u32,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub limit: u32,

    #[serde(default)]
    pub offset: u32,
}

impl SimilarSearchRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            count: default_count(),
            limit: default_limit(),
            offset: 0,
        }
    }

    /// One-based page index
    pub fn page(&self) -> u32 {
        (self.offset / self.limit.max(1)).saturating_add(1)
    }

    pub fn body(&self) -> Value {
        json!({
            "type_search": "id_search",
            "count": self.count,
            "pat_id": self.id,
        })
    }
}

/// A page of patents with the platform's total hit count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub total: u64,
    pub patents: Vec<Patent>,
}
