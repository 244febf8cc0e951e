//! SQLite-backed [`SearchIndex`].
//!
//! Documents live in `search_documents`; their lower-cased ingredient terms
//! are also exploded into `search_terms` so "must contain all" filters run
//! in SQL (`GROUP BY ... HAVING COUNT(DISTINCT term) = n`). Fuzzy text
//! matching and ranking happen afterwards in [`QueryPlan::rank`].
//!
//! The tables are created by [`ensure_index`](SearchIndex::ensure_index),
//! not by the primary migrations. Until then every call fails as
//! unavailable.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use recipehub_core::models::SearchDocument;
use recipehub_core::search::{QueryPlan, SearchIndex};
use recipehub_core::{CoreError, CoreResult};

use crate::db::store_error;

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn document_from_row(row: &SqliteRow) -> CoreResult<SearchDocument> {
    let terms_json: String = column(row, "ingredient_terms")?;
    let ingredient_terms: BTreeSet<String> = serde_json::from_str(&terms_json).map_err(|e| {
        CoreError::MalformedPayload(format!("bad ingredient_terms in index: {}", e))
    })?;
    Ok(SearchDocument {
        id: column(row, "id")?,
        title: column(row, "title")?,
        description: column(row, "description")?,
        cuisine: column(row, "cuisine")?,
        difficulty: column(row, "difficulty")?,
        cooking_time_minutes: column(row, "cooking_time_minutes")?,
        ingredient_terms,
    })
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> CoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| CoreError::MalformedPayload(format!("bad {} in index: {}", name, e)))
}

#[async_trait]
impl SearchIndex for SqliteIndex {
    async fn ensure_index(&self) -> CoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='search_documents'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        if exists {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                cuisine TEXT NOT NULL,
                difficulty TEXT NOT NULL,
                cooking_time_minutes INTEGER NOT NULL,
                ingredient_terms TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_terms (
                doc_id TEXT NOT NULL,
                term TEXT NOT NULL,
                PRIMARY KEY (doc_id, term)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_search_terms_term ON search_terms(term)")
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }

    async fn upsert(&self, doc: &SearchDocument) -> CoreResult<()> {
        let terms_json = serde_json::to_string(&doc.ingredient_terms)
            .map_err(|e| CoreError::MalformedPayload(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query(
            r#"
            INSERT INTO search_documents (id, title, description, cuisine, difficulty,
                                          cooking_time_minutes, ingredient_terms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                cuisine = excluded.cuisine,
                difficulty = excluded.difficulty,
                cooking_time_minutes = excluded.cooking_time_minutes,
                ingredient_terms = excluded.ingredient_terms
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.description)
        .bind(&doc.cuisine)
        .bind(&doc.difficulty)
        .bind(doc.cooking_time_minutes)
        .bind(&terms_json)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        sqlx::query("DELETE FROM search_terms WHERE doc_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        for term in &doc.ingredient_terms {
            sqlx::query("INSERT INTO search_terms (doc_id, term) VALUES (?, ?)")
                .bind(&doc.id)
                .bind(term)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query("DELETE FROM search_terms WHERE doc_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        sqlx::query("DELETE FROM search_documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<SearchDocument>> {
        let row = sqlx::query("SELECT * FROM search_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn search(&self, plan: &QueryPlan) -> CoreResult<Vec<SearchDocument>> {
        let rows = if plan.required_terms.is_empty() {
            sqlx::query("SELECT * FROM search_documents")
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?
        } else {
            let placeholders = vec!["?"; plan.required_terms.len()].join(", ");
            let sql = format!(
                r#"
                SELECT d.* FROM search_documents d
                WHERE d.id IN (
                    SELECT doc_id FROM search_terms
                    WHERE term IN ({})
                    GROUP BY doc_id
                    HAVING COUNT(DISTINCT term) = ?
                )
                "#,
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for term in &plan.required_terms {
                query = query.bind(term);
            }
            query
                .bind(plan.required_terms.len() as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?
        };

        // An undecodable row is skipped; it must not fail the whole query.
        let candidates = rows
            .iter()
            .filter_map(|row| match document_from_row(row) {
                Ok(doc) => Some(doc),
                Err(err) => {
                    let id: Option<String> = row.try_get("id").ok();
                    tracing::warn!(id = ?id, error = %err, "dropping malformed search document");
                    None
                }
            })
            .collect();
        Ok(plan.rank(candidates))
    }
}
