//! Postgres patent repository
//!
//! Batch writes are multi-row `INSERT ... ON CONFLICT` statements executed
//! inside one transaction, in the order given by [`PersistPlan`].

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, EntityTrait,
    QueryFilter, QuerySelect, Statement, TransactionTrait, Value,
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::db::models::{PatentColumn, PatentEntity, PatentRow};
use crate::db::plan::{ClassificationBatch, EntityBatch, PersistPlan};
use crate::db::store::{PatentStore, SummarySource};
use crate::db::{schema, DbPool};
use crate::domain::{
    AggregationResult, ClassificationKind, EntityKind, Lang, LinkEdge, Patent, Summary, SummaryCategory,
    TextKind,
};
use crate::errors::{AppError, Result};
use crate::metrics;

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;

/// Columns written by the patent upsert, in bind order
const PATENT_COLUMNS: [&str; 24] = [
    "id",
    "title_ru",
    "title_en",
    "publication_date",
    "application_number",
    "application_filing_date",
    "snippet_ru",
    "snippet_en",
    "abstract_ru",
    "abstract_en",
    "claims_ru",
    "claims_en",
    "description_ru",
    "description_en",
    "summary_description_title_ru",
    "summary_description_body_ru",
    "summary_snippet_title_ru",
    "summary_snippet_body_ru",
    "summary_abstract_title_ru",
    "summary_abstract_body_ru",
    "summary_claims_title_ru",
    "summary_claims_body_ru",
    "summary_all_title_ru",
    "summary_all_body_ru",
];

/// Postgres-backed [`PatentStore`]
#[derive(Clone)]
pub struct PatentRepository {
    pool: DbPool,
}

impl PatentRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Create missing tables on the primary
    pub async fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(self.write_conn()).await
    }

    // ========================================================================
    // Batch steps
    // ========================================================================

    async fn upsert_placeholders(txn: &DatabaseTransaction, ids: &[String]) -> Result<u64> {
        let rows = ids.iter().map(|id| vec![Value::from(id.clone())]).collect();
        insert_rows(txn, "INSERT INTO patent (id)", "ON CONFLICT (id) DO NOTHING", 1, rows).await
    }

    async fn upsert_patents(txn: &DatabaseTransaction, patents: &[Patent]) -> Result<u64> {
        let updates = PATENT_COLUMNS[1..]
            .iter()
            .map(|col| format!("{col} = COALESCE(EXCLUDED.{col}, patent.{col})"))
            .collect::<Vec<_>>()
            .join(",\n    ");
        let head = format!("INSERT INTO patent ({})", PATENT_COLUMNS.join(", "));
        let tail = format!("ON CONFLICT (id) DO UPDATE SET\n    {updates}");

        let rows = patents.iter().map(patent_values).collect();
        insert_rows(txn, &head, &tail, PATENT_COLUMNS.len(), rows).await
    }

    async fn upsert_classifications(txn: &DatabaseTransaction, batch: &ClassificationBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let table = batch.table();

        let codes = batch.distinct_codes().into_iter().map(|c| vec![Value::from(c)]).collect();
        insert_rows(
            txn,
            &format!("INSERT INTO {table} (id)"),
            "ON CONFLICT (id) DO NOTHING",
            1,
            codes,
        )
        .await?;

        let links = batch
            .links()
            .into_iter()
            .map(|(patent_id, code)| vec![Value::from(patent_id), Value::from(code)])
            .collect();
        insert_rows(
            txn,
            &format!("INSERT INTO patent_{table} (patent_id, {table}_id)"),
            "ON CONFLICT DO NOTHING",
            2,
            links,
        )
        .await
    }

    /// Insert new names once, resolve every name to its id, then link
    async fn upsert_entities(txn: &DatabaseTransaction, batch: &EntityBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let table = batch.table();
        let names = batch.distinct_names();

        let rows = names.iter().map(|n| vec![Value::from(n.clone())]).collect();
        insert_rows(
            txn,
            &format!("INSERT INTO {table} (name)"),
            "ON CONFLICT (name) DO NOTHING",
            1,
            rows,
        )
        .await?;

        let mut ids: HashMap<String, i32> = HashMap::with_capacity(names.len());
        for chunk in names.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "SELECT id, name FROM {table} WHERE name IN ({})",
                placeholders(1, chunk.len())
            );
            let values = chunk.iter().map(|n| Value::from(n.clone())).collect::<Vec<_>>();
            let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
            for row in txn.query_all(stmt).await? {
                let id: i32 = row.try_get_by_index(0)?;
                let name: String = row.try_get_by_index(1)?;
                ids.insert(name, id);
            }
        }

        if ids.len() != names.len() {
            return Err(AppError::Integrity {
                message: format!("{} of {} names in {} could not be resolved", names.len() - ids.len(), names.len(), table),
            });
        }

        let links = batch
            .resolve_links(&ids)
            .into_iter()
            .map(|(patent_id, id)| vec![Value::from(patent_id), Value::from(id)])
            .collect();
        insert_rows(
            txn,
            &format!("INSERT INTO {} (patent_id, {})", batch.join_table(), batch.join_column()),
            "ON CONFLICT DO NOTHING",
            2,
            links,
        )
        .await
    }

    async fn upsert_links(txn: &DatabaseTransaction, table: &str, edges: &[LinkEdge]) -> Result<u64> {
        let rows = edges
            .iter()
            .map(|e| vec![Value::from(e.source_id.clone()), Value::from(e.referred_id.clone())])
            .collect();
        insert_rows(
            txn,
            &format!("INSERT INTO {table} (source_id, referred_id)"),
            "ON CONFLICT (source_id, referred_id) DO NOTHING",
            2,
            rows,
        )
        .await
    }

    async fn execute_plan(&self, plan: &PersistPlan) -> Result<()> {
        let txn = self.write_conn().begin().await?;

        let n = Self::upsert_placeholders(&txn, &plan.placeholders).await?;
        debug!(rows = n, "Placeholders upserted");

        let n = Self::upsert_patents(&txn, &plan.patents).await?;
        debug!(rows = n, "Patents upserted");

        for batch in &plan.classifications {
            let n = Self::upsert_classifications(&txn, batch).await?;
            debug!(table = batch.table(), rows = n, "Classifications linked");
        }

        for batch in &plan.entities {
            let n = Self::upsert_entities(&txn, batch).await?;
            debug!(table = %batch.table(), rows = n, "Entities linked");
        }

        Self::upsert_links(&txn, "patent_referred_from", &plan.references).await?;
        Self::upsert_links(&txn, "patent_prototype_docs", &plan.prototypes).await?;

        let rows = plan
            .family
            .iter()
            .map(|e| {
                vec![
                    Value::from(e.first_id.clone()),
                    Value::from(e.second_id.clone()),
                    Value::from(e.referred_id.clone()),
                    Value::from(e.similarity),
                    Value::from(e.similarity_norm),
                ]
            })
            .collect();
        insert_rows(
            &txn,
            "INSERT INTO patent_family_similarity (first_id, second_id, referred_id, similarity, similarity_norm)",
            "ON CONFLICT (first_id, second_id) DO UPDATE SET
    referred_id = EXCLUDED.referred_id,
    similarity = EXCLUDED.similarity,
    similarity_norm = EXCLUDED.similarity_norm",
            5,
            rows,
        )
        .await?;

        let rows = plan
            .search_similarity
            .iter()
            .map(|e| {
                vec![
                    Value::from(e.search_patent_id.clone()),
                    Value::from(e.found_patent_id.clone()),
                    Value::from(e.similarity),
                    Value::from(e.similarity_norm),
                ]
            })
            .collect();
        insert_rows(
            &txn,
            "INSERT INTO patent_similarity (search_patent_id, found_patent_id, similarity, similarity_norm)",
            "ON CONFLICT (search_patent_id, found_patent_id) DO UPDATE SET
    similarity = EXCLUDED.similarity,
    similarity_norm = EXCLUDED.similarity_norm",
            4,
            rows,
        )
        .await?;

        txn.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    async fn find_rows(&self, ids: &[String]) -> Result<Vec<PatentRow>> {
        let mut rows = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BIND_PARAMS) {
            rows.extend(
                PatentEntity::find()
                    .filter(PatentColumn::Id.is_in(chunk.iter().cloned()))
                    .all(self.read_conn())
                    .await?,
            );
        }
        Ok(rows)
    }

    /// (patent id, value) pairs from a two-column query keyed by patent id
    async fn fetch_pairs(&self, sql_prefix: &str, ids: &[String]) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for chunk in ids.chunks(MAX_BIND_PARAMS) {
            let sql = format!("{sql_prefix} IN ({})", placeholders(1, chunk.len()));
            let values = chunk.iter().map(|id| Value::from(id.clone())).collect::<Vec<_>>();
            let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
            for row in self.read_conn().query_all(stmt).await? {
                pairs.push((row.try_get_by_index::<String>(0)?, row.try_get_by_index::<String>(1)?));
            }
        }
        pairs.sort();
        Ok(pairs)
    }
}

#[async_trait]
impl PatentStore for PatentRepository {
    #[instrument(skip(self, batch), fields(patents = batch.patents.len(), placeholders = batch.placeholders.len()))]
    async fn persist(&self, batch: &AggregationResult) -> Result<()> {
        let plan = PersistPlan::build(batch);
        if plan.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        self.execute_plan(&plan).await?;
        let elapsed = start.elapsed().as_secs_f64();

        metrics::record_persisted(elapsed, &plan.row_counts());
        info!(
            patents = plan.patents.len(),
            references = plan.references.len(),
            prototypes = plan.prototypes.len(),
            family = plan.family.len(),
            duration_ms = (elapsed * 1000.0) as u64,
            "Batch committed"
        );
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn deep_field_state(&self, ids: &[String]) -> Result<Vec<Patent>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BIND_PARAMS) {
            let rows: Vec<(String, Option<String>, Option<String>, Option<String>, Option<String>)> =
                PatentEntity::find()
                    .select_only()
                    .columns([
                        PatentColumn::Id,
                        PatentColumn::ClaimsRu,
                        PatentColumn::ClaimsEn,
                        PatentColumn::DescriptionRu,
                        PatentColumn::DescriptionEn,
                    ])
                    .filter(PatentColumn::Id.is_in(chunk.iter().cloned()))
                    .into_tuple()
                    .all(self.read_conn())
                    .await?;

            out.extend(rows.into_iter().map(|(id, claims_ru, claims_en, description_ru, description_en)| {
                Patent {
                    claims_ru,
                    claims_en,
                    description_ru,
                    description_en,
                    ..Patent::with_id(id)
                }
            }));
        }
        Ok(out)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn existing_patents(&self, ids: &[String]) -> Result<Vec<Patent>> {
        let rows = self.find_rows(ids).await?;
        let found: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut patents: Vec<Patent> = rows.into_iter().map(Patent::from).collect();
        let index: HashMap<String, usize> = found.iter().cloned().enumerate().map(|(i, id)| (id, i)).collect();

        for kind in ClassificationKind::ALL {
            let table = kind.as_str();
            let sql = format!("SELECT patent_id, {table}_id FROM patent_{table} WHERE patent_id");
            for (patent_id, code) in self.fetch_pairs(&sql, &found).await? {
                if let Some(&i) = index.get(&patent_id) {
                    patents[i].codes_mut(kind).get_or_insert_with(Vec::new).push(code);
                }
            }
        }

        for kind in EntityKind::ALL {
            for lang in Lang::ALL {
                let table = format!("{}_{}", kind.as_str(), lang.as_str());
                let sql = format!(
                    "SELECT j.patent_id, e.name FROM patent_{table} j JOIN {table} e ON e.id = j.{}_id WHERE j.patent_id",
                    kind.as_str()
                );
                for (patent_id, name) in self.fetch_pairs(&sql, &found).await? {
                    if let Some(&i) = index.get(&patent_id) {
                        patents[i].entity_names_mut(kind, lang).get_or_insert_with(Vec::new).push(name);
                    }
                }
            }
        }

        let sql = "SELECT source_id, referred_id FROM patent_referred_from WHERE source_id";
        for (source_id, referred_id) in self.fetch_pairs(sql, &found).await? {
            if let Some(&i) = index.get(&source_id) {
                patents[i].referred_from_ids.get_or_insert_with(Vec::new).push(referred_id);
            }
        }

        let sql = "SELECT source_id, referred_id FROM patent_prototype_docs WHERE source_id";
        for (source_id, referred_id) in self.fetch_pairs(sql, &found).await? {
            if let Some(&i) = index.get(&source_id) {
                patents[i].prototype_docs_ids.get_or_insert_with(Vec::new).push(referred_id);
            }
        }

        Ok(patents)
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for chunk in ids.chunks(MAX_BIND_PARAMS) {
            let found: Vec<String> = PatentEntity::find()
                .select_only()
                .column(PatentColumn::Id)
                .filter(PatentColumn::Id.is_in(chunk.iter().cloned()))
                .into_tuple()
                .all(self.read_conn())
                .await?;
            out.extend(found);
        }
        Ok(out)
    }

    async fn summary_source(&self, id: &str, category: SummaryCategory) -> Result<SummarySource> {
        let row = PatentEntity::find_by_id(id.to_string())
            .one(self.read_conn())
            .await?
            .ok_or_else(|| AppError::PatentNotFound { id: id.to_string() })?;

        let summary = row.summary(category);
        let text = Patent::from(row).summary_source_text(category);
        Ok(SummarySource { text, summary })
    }

    #[instrument(skip(self, summary))]
    async fn save_summary(&self, id: &str, category: SummaryCategory, summary: &Summary) -> Result<()> {
        let (title_col, body_col) = PatentRow::summary_columns(category);
        let result = PatentEntity::update_many()
            .col_expr(title_col, Expr::value(summary.title.clone()))
            .col_expr(body_col, Expr::value(summary.body.clone()))
            .filter(PatentColumn::Id.eq(id))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::PatentNotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

/// Bind values of one patent row, in [`PATENT_COLUMNS`] order
fn patent_values(p: &Patent) -> Vec<Value> {
    let mut values = vec![
        Value::from(p.id.clone()),
        Value::from(p.title_ru.clone()),
        Value::from(p.title_en.clone()),
        Value::from(p.publication_date),
        Value::from(p.application_number.clone()),
        Value::from(p.application_filing_date),
    ];
    for kind in TextKind::ALL {
        for lang in Lang::ALL {
            values.push(Value::from(p.text(kind, lang).map(str::to_string)));
        }
    }
    for category in SummaryCategory::ALL {
        let summary = p.summaries.get(&category).cloned().unwrap_or_default();
        values.push(Value::from(summary.title));
        values.push(Value::from(summary.body));
    }
    values
}

/// `$start, $start+1, ...` for `count` parameters
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `($1, $2), ($3, $4), ...` for `rows` tuples of `width` parameters
fn values_clause(rows: usize, width: usize) -> String {
    (0..rows)
        .map(|r| format!("({})", placeholders(r * width + 1, width)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run `head VALUES ... tail` over `rows`, chunked below the bind limit
async fn insert_rows<C: ConnectionTrait>(
    conn: &C,
    head: &str,
    tail: &str,
    width: usize,
    rows: Vec<Vec<Value>>,
) -> Result<u64> {
    let mut affected = 0;
    for chunk in rows.chunks(MAX_BIND_PARAMS / width) {
        let sql = format!("{head} VALUES {} {tail}", values_clause(chunk.len(), width));
        let values: Vec<Value> = chunk.iter().flatten().cloned().collect();
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
        affected += conn.execute(stmt).await?.rows_affected();
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_clause() {
        assert_eq!(placeholders(3, 2), "$3, $4");
        assert_eq!(values_clause(2, 3), "($1, $2, $3), ($4, $5, $6)");
        assert_eq!(values_clause(0, 3), "");
    }

    #[test]
    fn test_patent_values_match_columns() {
        let mut patent = Patent {
            claims_en: Some("1. A pump.".into()),
            ..Patent::with_id("RU1")
        };
        patent.summaries.insert(
            SummaryCategory::All,
            Summary { title: Some("Насос".into()), body: None },
        );
        let values = patent_values(&patent);
        assert_eq!(values.len(), PATENT_COLUMNS.len());

        let claims_en = PATENT_COLUMNS.iter().position(|c| *c == "claims_en").unwrap();
        assert_eq!(values[claims_en], Value::from(Some("1. A pump.".to_string())));

        let all_title = PATENT_COLUMNS.iter().position(|c| *c == "summary_all_title_ru").unwrap();
        assert_eq!(values[all_title], Value::from(Some("Насос".to_string())));
    }

    #[test]
    fn test_text_column_order_matches_accessors() {
        let mut i = 6;
        for kind in TextKind::ALL {
            for lang in Lang::ALL {
                assert_eq!(PATENT_COLUMNS[i], format!("{}_{}", kind.as_str(), lang.as_str()));
                i += 1;
            }
        }
        for category in SummaryCategory::ALL {
            assert_eq!(PATENT_COLUMNS[i], format!("summary_{}_title_ru", category.as_str()));
            assert_eq!(PATENT_COLUMNS[i + 1], format!("summary_{}_body_ru", category.as_str()));
            i += 2;
        }
    }
}
