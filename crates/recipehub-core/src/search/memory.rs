//! In-memory [`SearchIndex`] for tests and embedded use.
//!
//! Documents live in a `HashMap` behind a lock, so each upsert or delete is
//! atomic per document. Queries scan every document.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{QueryPlan, SearchIndex};
use crate::error::{CoreError, CoreResult};
use crate::models::SearchDocument;

pub struct InMemoryIndex {
    docs: RwLock<Option<HashMap<String, SearchDocument>>>,
    available: AtomicBool,
}

impl InMemoryIndex {
    /// An index whose collection already exists.
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Some(HashMap::new())),
            available: AtomicBool::new(true),
        }
    }

    /// An index whose collection has not been created yet.
    pub fn uninitialized() -> Self {
        Self {
            docs: RwLock::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Toggles simulated reachability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.docs.read().as_ref().map(HashMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::TransportUnavailable(
                "search index unreachable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_collection() -> CoreError {
    CoreError::TransportUnavailable("search index has not been created".to_string())
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn ensure_index(&self) -> CoreResult<bool> {
        self.check()?;
        let mut docs = self.docs.write();
        if docs.is_some() {
            return Ok(false);
        }
        *docs = Some(HashMap::new());
        Ok(true)
    }

    async fn upsert(&self, doc: &SearchDocument) -> CoreResult<()> {
        self.check()?;
        let mut guard = self.docs.write();
        let docs = guard.as_mut().ok_or_else(missing_collection)?;
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> CoreResult<()> {
        self.check()?;
        let mut guard = self.docs.write();
        let docs = guard.as_mut().ok_or_else(missing_collection)?;
        docs.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<SearchDocument>> {
        self.check()?;
        let guard = self.docs.read();
        let docs = guard.as_ref().ok_or_else(missing_collection)?;
        Ok(docs.get(id).cloned())
    }

    async fn search(&self, plan: &QueryPlan) -> CoreResult<Vec<SearchDocument>> {
        self.check()?;
        let candidates: Vec<SearchDocument> = {
            let guard = self.docs.read();
            let docs = guard.as_ref().ok_or_else(missing_collection)?;
            docs.values()
                .filter(|d| plan.admits_terms(&d.ingredient_terms))
                .cloned()
                .collect()
        };
        Ok(plan.rank(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn doc(id: &str) -> SearchDocument {
        SearchDocument {
            id: id.to_string(),
            title: "Bread".to_string(),
            description: String::new(),
            cuisine: "French".to_string(),
            difficulty: "easy".to_string(),
            cooking_time_minutes: 60,
            ingredient_terms: BTreeSet::from(["flour".to_string()]),
        }
    }

    #[tokio::test]
    async fn test_ensure_index_creates_once() {
        let index = InMemoryIndex::uninitialized();
        assert!(index.upsert(&doc("r1")).await.is_err());
        assert!(index.ensure_index().await.unwrap());
        assert!(!index.ensure_index().await.unwrap());
        index.upsert(&doc("r1")).await.unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_index_keeps_existing_documents() {
        let index = InMemoryIndex::new();
        index.upsert(&doc("r1")).await.unwrap();
        assert!(!index.ensure_index().await.unwrap());
        assert_eq!(index.get("r1").await.unwrap(), Some(doc("r1")));
    }
}
