//! Search-index synchronization and querying.
//!
//! The index holds one [`SearchDocument`] per recipe, derived from the
//! primary store and kept eventually consistent by the recipe write path.
//! Queries read only from the index.
//!
//! # Query construction
//!
//! 1. A query with no free text and no required ingredient returns nothing.
//! 2. Required ingredients are lower-cased; a document must contain every
//!    one of them in `ingredient_terms`.
//! 3. Free text must fuzzy-match the title or the description (see
//!    [`fuzzy`]); at least one query token has to match.
//! 4. Results are ranked by best-field score (desc), then id (asc), and
//!    truncated to the configured limit.

pub mod fuzzy;
pub mod memory;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{with_timeout, CoreResult};
use crate::models::{Recipe, SearchDocument, SearchQuery};

pub use memory::InMemoryIndex;

/// Normalized, validated form of a [`SearchQuery`] that index backends execute.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Lower-cased free-text tokens; empty when no text was given.
    pub text_tokens: Vec<String>,
    /// Lower-cased ingredient terms that must all be present.
    pub required_terms: BTreeSet<String>,
    pub limit: usize,
}

impl QueryPlan {
    /// Builds a plan, or `None` for a query that must return nothing.
    pub fn from_query(query: &SearchQuery, limit: usize) -> Option<Self> {
        let text_tokens = query.text().map(fuzzy::tokenize).unwrap_or_default();
        let required_terms = query.required_terms();
        if text_tokens.is_empty() && required_terms.is_empty() {
            return None;
        }
        Some(Self {
            text_tokens,
            required_terms,
            limit,
        })
    }

    pub fn admits_terms(&self, terms: &BTreeSet<String>) -> bool {
        self.required_terms.is_subset(terms)
    }

    /// Filters and orders `candidates`. Backends may pre-narrow candidates
    /// however they like; this is the single source of matching truth.
    pub fn rank(&self, candidates: Vec<SearchDocument>) -> Vec<SearchDocument> {
        let mut scored: Vec<(f64, SearchDocument)> = candidates
            .into_iter()
            .filter(|doc| self.admits_terms(&doc.ingredient_terms))
            .filter_map(|doc| {
                if self.text_tokens.is_empty() {
                    return Some((0.0, doc));
                }
                fuzzy::score(&self.text_tokens, &[&doc.title, &doc.description])
                    .map(|s| (s, doc))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(self.limit);
        scored.into_iter().map(|(_, doc)| doc).collect()
    }
}

/// Storage backend for search documents.
///
/// Per-document writes must be atomic: a concurrent reader sees either the
/// old or the new document, never a mix.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Creates the backing collection if it does not exist. Returns `true`
    /// when it had to be created. Never reindexes existing records.
    async fn ensure_index(&self) -> CoreResult<bool>;

    /// Replaces the stored document with the same id in full.
    async fn upsert(&self, doc: &SearchDocument) -> CoreResult<()>;

    /// Deletes a document; deleting an absent id succeeds.
    async fn remove(&self, id: &str) -> CoreResult<()>;

    async fn get(&self, id: &str) -> CoreResult<Option<SearchDocument>>;

    async fn search(&self, plan: &QueryPlan) -> CoreResult<Vec<SearchDocument>>;
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Upper bound for any single index call.
    pub timeout: Duration,
    pub result_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            result_limit: 50,
        }
    }
}

/// Keeps the index in step with primary recipe records and answers queries.
///
/// Failures are always returned to the caller, never swallowed: an
/// unreachable or slow index surfaces as
/// [`CoreError::TransportUnavailable`](crate::CoreError::TransportUnavailable).
#[derive(Clone)]
pub struct SearchSynchronizer {
    index: Arc<dyn SearchIndex>,
    settings: SearchSettings,
}

impl SearchSynchronizer {
    pub fn new(index: Arc<dyn SearchIndex>, settings: SearchSettings) -> Self {
        Self { index, settings }
    }

    /// Ensures the backing collection exists, creating it empty if needed.
    pub async fn bootstrap(&self) -> CoreResult<()> {
        let created =
            with_timeout("ensure index", self.settings.timeout, self.index.ensure_index()).await?;
        if created {
            tracing::info!("search index not found; created empty index");
        } else {
            tracing::info!("search index already exists");
        }
        Ok(())
    }

    /// Upserts the document derived from `recipe`. Idempotent.
    pub async fn index_record(&self, recipe: &Recipe) -> CoreResult<SearchDocument> {
        let doc = SearchDocument::from_recipe(recipe);
        with_timeout("index record", self.settings.timeout, self.index.upsert(&doc)).await?;
        tracing::debug!(id = %doc.id, terms = doc.ingredient_terms.len(), "indexed recipe");
        Ok(doc)
    }

    pub async fn remove_record(&self, id: &str) -> CoreResult<()> {
        with_timeout("remove record", self.settings.timeout, self.index.remove(id)).await?;
        tracing::debug!(id, "removed recipe from index");
        Ok(())
    }

    pub async fn query(&self, query: &SearchQuery) -> CoreResult<Vec<SearchDocument>> {
        let plan = match QueryPlan::from_query(query, self.settings.result_limit) {
            Some(plan) => plan,
            None => return Ok(Vec::new()),
        };
        with_timeout("search", self.settings.timeout, self.index.search(&plan)).await
    }

    pub async fn document(&self, id: &str) -> CoreResult<Option<SearchDocument>> {
        with_timeout("get document", self.settings.timeout, self.index.get(id)).await
    }
}
