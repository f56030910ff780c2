//! Patent entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{Patent, Summary, SummaryCategory};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "patent")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub title_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub title_en: Option<String>,

    pub publication_date: Option<Date>,
    pub application_number: Option<String>,
    pub application_filing_date: Option<Date>,

    #[sea_orm(column_type = "Text", nullable)]
    pub snippet_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub snippet_en: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub abstract_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub abstract_en: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub claims_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub claims_en: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description_en: Option<String>,

    /// Generated summaries (ru) per field category
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_description_title_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_description_body_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_snippet_title_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_snippet_body_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_abstract_title_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_abstract_body_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_claims_title_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_claims_body_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_all_title_ru: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary_all_body_ru: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn summary(&self, category: SummaryCategory) -> Summary {
        let (title, body) = match category {
            SummaryCategory::Description => (&self.summary_description_title_ru, &self.summary_description_body_ru),
            SummaryCategory::Snippet => (&self.summary_snippet_title_ru, &self.summary_snippet_body_ru),
            SummaryCategory::Abstract => (&self.summary_abstract_title_ru, &self.summary_abstract_body_ru),
            SummaryCategory::Claims => (&self.summary_claims_title_ru, &self.summary_claims_body_ru),
            SummaryCategory::All => (&self.summary_all_title_ru, &self.summary_all_body_ru),
        };
        Summary {
            title: title.clone(),
            body: body.clone(),
        }
    }

    /// Column pair holding a category's summary
    pub fn summary_columns(category: SummaryCategory) -> (Column, Column) {
        match category {
            SummaryCategory::Description => (Column::SummaryDescriptionTitleRu, Column::SummaryDescriptionBodyRu),
            SummaryCategory::Snippet => (Column::SummarySnippetTitleRu, Column::SummarySnippetBodyRu),
            SummaryCategory::Abstract => (Column::SummaryAbstractTitleRu, Column::SummaryAbstractBodyRu),
            SummaryCategory::Claims => (Column::SummaryClaimsTitleRu, Column::SummaryClaimsBodyRu),
            SummaryCategory::All => (Column::SummaryAllTitleRu, Column::SummaryAllBodyRu),
        }
    }
}

impl From<Model> for Patent {
    fn from(row: Model) -> Self {
        let mut summaries = std::collections::BTreeMap::new();
        for category in SummaryCategory::ALL {
            let summary = row.summary(category);
            if !summary.is_empty() {
                summaries.insert(category, summary);
            }
        }

        Patent {
            id: row.id,
            title_ru: row.title_ru,
            title_en: row.title_en,
            publication_date: row.publication_date,
            application_number: row.application_number,
            application_filing_date: row.application_filing_date,
            snippet_ru: row.snippet_ru,
            snippet_en: row.snippet_en,
            abstract_ru: row.abstract_ru,
            abstract_en: row.abstract_en,
            claims_ru: row.claims_ru,
            claims_en: row.claims_en,
            description_ru: row.description_ru,
            description_en: row.description_en,
            summaries,
            ..Default::default()
        }
    }
}
