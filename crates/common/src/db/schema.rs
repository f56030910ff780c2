//! Relational schema
//!
//! Every statement is idempotent so it can run at each start-up.

use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::info;

use crate::domain::{ClassificationKind, EntityKind, Lang, SummaryCategory};
use crate::errors::Result;

fn patent_table() -> String {
    let mut summary_columns = String::new();
    for category in SummaryCategory::ALL {
        summary_columns.push_str(&format!(
            ",\n    summary_{c}_title_ru TEXT,\n    summary_{c}_body_ru TEXT",
            c = category.as_str()
        ));
    }

    format!(
        r#"CREATE TABLE IF NOT EXISTS patent (
    id VARCHAR PRIMARY KEY,
    title_ru TEXT,
    title_en TEXT,
    publication_date DATE,
    application_number VARCHAR,
    application_filing_date DATE,
    snippet_ru TEXT,
    snippet_en TEXT,
    abstract_ru TEXT,
    abstract_en TEXT,
    claims_ru TEXT,
    claims_en TEXT,
    description_ru TEXT,
    description_en TEXT{}
)"#,
        summary_columns
    )
}

/// All CREATE statements, in dependency order
pub fn statements() -> Vec<String> {
    let mut out = vec![patent_table()];

    for kind in ClassificationKind::ALL {
        let table = kind.as_str();
        out.push(format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    id VARCHAR PRIMARY KEY,\n    description TEXT\n)"
        ));
        out.push(format!(
            r#"CREATE TABLE IF NOT EXISTS patent_{table} (
    patent_id VARCHAR NOT NULL REFERENCES patent(id),
    {table}_id VARCHAR NOT NULL REFERENCES {table}(id),
    PRIMARY KEY (patent_id, {table}_id)
)"#
        ));
    }

    for kind in EntityKind::ALL {
        for lang in Lang::ALL {
            let entity = kind.as_str();
            let table = format!("{}_{}", entity, lang.as_str());
            out.push(format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    id SERIAL PRIMARY KEY,\n    name TEXT NOT NULL UNIQUE\n)"
            ));
            out.push(format!(
                r#"CREATE TABLE IF NOT EXISTS patent_{table} (
    patent_id VARCHAR NOT NULL REFERENCES patent(id),
    {entity}_id INTEGER NOT NULL REFERENCES {table}(id),
    PRIMARY KEY (patent_id, {entity}_id)
)"#
            ));
        }
    }

    for table in ["patent_referred_from", "patent_prototype_docs"] {
        out.push(format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
    source_id VARCHAR NOT NULL REFERENCES patent(id),
    referred_id VARCHAR NOT NULL REFERENCES patent(id),
    PRIMARY KEY (source_id, referred_id)
)"#
        ));
    }

    out.push(
        r#"CREATE TABLE IF NOT EXISTS patent_family_similarity (
    first_id VARCHAR NOT NULL REFERENCES patent(id),
    second_id VARCHAR NOT NULL REFERENCES patent(id),
    referred_id VARCHAR NOT NULL REFERENCES patent(id),
    similarity DOUBLE PRECISION,
    similarity_norm DOUBLE PRECISION,
    PRIMARY KEY (first_id, second_id),
    CHECK (first_id < second_id)
)"#
        .to_string(),
    );

    out.push(
        r#"CREATE TABLE IF NOT EXISTS patent_similarity (
    search_patent_id VARCHAR NOT NULL REFERENCES patent(id),
    found_patent_id VARCHAR NOT NULL REFERENCES patent(id),
    similarity DOUBLE PRECISION,
    similarity_norm DOUBLE PRECISION,
    PRIMARY KEY (search_patent_id, found_patent_id)
)"#
        .to_string(),
    );

    out
}

/// Create missing tables
pub async fn ensure_schema(conn: &DatabaseConnection) -> Result<()> {
    let statements = statements();
    for sql in &statements {
        conn.execute_unprepared(sql).await?;
    }
    info!(tables = statements.len(), "Schema ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_count() {
        // patent + 2x(classification, join) + 6x(entity, join) + 2 links + 2 similarity
        assert_eq!(statements().len(), 1 + 4 + 12 + 2 + 2);
    }

    #[test]
    fn test_patent_table_has_summary_slots() {
        let sql = patent_table();
        assert!(sql.contains("summary_all_title_ru TEXT"));
        assert!(sql.contains("summary_claims_body_ru TEXT"));
    }

    #[test]
    fn test_entity_join_columns() {
        let all = statements().join("\n");
        assert!(all.contains("CREATE TABLE IF NOT EXISTS patent_inventor_en"));
        assert!(all.contains("inventor_id INTEGER NOT NULL REFERENCES inventor_en(id)"));
    }

    #[test]
    fn test_family_pairs_strictly_ordered() {
        let all = statements().join("\n");
        assert!(all.contains("CHECK (first_id < second_id)"));
    }
}
