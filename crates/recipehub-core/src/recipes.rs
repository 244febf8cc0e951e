//! Recipe write path.
//!
//! Every successful create, update or delete in the primary store is
//! followed by the matching index operation. The primary write is the
//! source of truth: if the index call fails afterwards, the write is not
//! rolled back. The failure comes back as [`WriteOutcome::index_warning`]
//! and can be retried later with [`RecipeService::resync`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{with_timeout, CoreError, CoreResult};
use crate::models::{Recipe, RecipeInput, RecipePatch};
use crate::search::SearchSynchronizer;
use crate::store::PrimaryStore;

/// Result of a primary write plus its index follow-up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome<T> {
    pub record: T,
    /// Set when the primary write succeeded but the index was not updated.
    #[serde(serialize_with = "serialize_warning")]
    pub index_warning: Option<CoreError>,
}

fn serialize_warning<S>(warning: &Option<CoreError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match warning {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

impl<T> WriteOutcome<T> {
    pub fn is_synced(&self) -> bool {
        self.index_warning.is_none()
    }
}

fn validate_input(input: &RecipeInput) -> CoreResult<()> {
    if input.title.trim().is_empty() {
        return Err(CoreError::InvalidInput(
            "recipe title must not be empty".to_string(),
        ));
    }
    validate_minutes(input.cooking_time_minutes)
}

fn validate_patch(patch: &RecipePatch) -> CoreResult<()> {
    if let Some(ref title) = patch.title {
        if title.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "recipe title must not be empty".to_string(),
            ));
        }
    }
    match patch.cooking_time_minutes {
        Some(minutes) => validate_minutes(minutes),
        None => Ok(()),
    }
}

fn validate_minutes(minutes: i64) -> CoreResult<()> {
    if minutes < 0 {
        return Err(CoreError::InvalidInput(format!(
            "cooking time must not be negative: {}",
            minutes
        )));
    }
    Ok(())
}

/// Recipe CRUD with search-index synchronization.
pub struct RecipeService {
    store: Arc<dyn PrimaryStore>,
    search: SearchSynchronizer,
    store_timeout: Duration,
}

impl RecipeService {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        search: SearchSynchronizer,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            search,
            store_timeout,
        }
    }

    pub async fn create(
        &self,
        author_id: &str,
        input: &RecipeInput,
    ) -> CoreResult<WriteOutcome<Recipe>> {
        validate_input(input)?;
        let recipe = with_timeout(
            "create recipe",
            self.store_timeout,
            self.store.create_recipe(author_id, input),
        )
        .await?;
        let index_warning = self.index(&recipe).await;
        Ok(WriteOutcome {
            record: recipe,
            index_warning,
        })
    }

    /// Applies `patch` when `actor_id` is the recipe's author.
    pub async fn update(
        &self,
        id: &str,
        actor_id: &str,
        patch: &RecipePatch,
    ) -> CoreResult<WriteOutcome<Recipe>> {
        validate_patch(patch)?;
        self.require_author(id, actor_id).await?;
        let recipe = with_timeout(
            "update recipe",
            self.store_timeout,
            self.store.update_recipe(id, patch),
        )
        .await?;
        let index_warning = self.index(&recipe).await;
        Ok(WriteOutcome {
            record: recipe,
            index_warning,
        })
    }

    /// Deletes the recipe and its comments when `actor_id` is the author.
    pub async fn delete(&self, id: &str, actor_id: &str) -> CoreResult<WriteOutcome<Recipe>> {
        self.require_author(id, actor_id).await?;
        let recipe = with_timeout(
            "delete recipe",
            self.store_timeout,
            self.store.delete_recipe(id),
        )
        .await?;
        let index_warning = match self.search.remove_record(&recipe.id).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(id = %recipe.id, error = %err, "recipe deleted but index removal failed");
                Some(err)
            }
        };
        Ok(WriteOutcome {
            record: recipe,
            index_warning,
        })
    }

    pub async fn get(&self, id: &str) -> CoreResult<Recipe> {
        with_timeout("get recipe", self.store_timeout, self.store.get_recipe(id))
            .await?
            .ok_or_else(|| CoreError::not_found("recipe", id))
    }

    pub async fn list(&self) -> CoreResult<Vec<Recipe>> {
        with_timeout("list recipes", self.store_timeout, self.store.list_recipes()).await
    }

    /// Re-derives the index entry for `id` from the primary store without
    /// touching the primary record: upserts it when the recipe exists,
    /// removes it otherwise.
    pub async fn resync(&self, id: &str) -> CoreResult<()> {
        let recipe =
            with_timeout("get recipe", self.store_timeout, self.store.get_recipe(id)).await?;
        match recipe {
            Some(recipe) => {
                self.search.index_record(&recipe).await?;
                self.drop_if_deleted(id).await.map(|_| ())
            }
            None => self.search.remove_record(id).await,
        }
    }

    async fn require_author(&self, id: &str, actor_id: &str) -> CoreResult<()> {
        let recipe = self.get(id).await?;
        if recipe.author_id != actor_id {
            return Err(CoreError::Forbidden(format!(
                "user {} is not the author of recipe {}",
                actor_id, id
            )));
        }
        Ok(())
    }

    async fn index(&self, recipe: &Recipe) -> Option<CoreError> {
        if let Err(err) = self.search.index_record(recipe).await {
            tracing::warn!(id = %recipe.id, error = %err, "recipe saved but not indexed");
            return Some(err);
        }
        match self.drop_if_deleted(&recipe.id).await {
            Ok(false) => None,
            Ok(true) => {
                tracing::warn!(id = %recipe.id, "recipe deleted while being indexed");
                Some(CoreError::Conflict(format!(
                    "recipe {} was deleted while being indexed",
                    recipe.id
                )))
            }
            Err(err) => {
                tracing::warn!(id = %recipe.id, error = %err, "could not confirm indexed recipe still exists");
                Some(err)
            }
        }
    }

    /// Runs after an upsert. A delete that finished while the upsert was in
    /// flight would otherwise leave its document behind, so the document is
    /// removed again when the primary record is gone. Returns `true` then.
    async fn drop_if_deleted(&self, id: &str) -> CoreResult<bool> {
        let current =
            with_timeout("get recipe", self.store_timeout, self.store.get_recipe(id)).await?;
        if current.is_some() {
            return Ok(false);
        }
        self.search.remove_record(id).await?;
        Ok(true)
    }
}
