//! In-memory [`PrimaryStore`] implementation for testing.
//!
//! All tables share one lock so multi-row writes are atomic, the way a
//! transaction would make them. Foreign keys are checked on insert.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::PrimaryStore;
use crate::error::{CoreError, CoreResult};
use crate::models::{AuthorSnapshot, Comment, Recipe, RecipeInput, RecipePatch, User};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    recipes: HashMap<String, Recipe>,
    comments: Vec<Comment>,
}

pub struct InMemoryPrimaryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl InMemoryPrimaryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggles simulated reachability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::TransportUnavailable(
                "primary store unreachable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryPrimaryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
impl PrimaryStore for InMemoryPrimaryStore {
    async fn create_user(&self, username: &str, display_name: Option<&str>) -> CoreResult<User> {
        self.check()?;
        let mut tables = self.tables.write();
        if tables.users.values().any(|u| u.username == username) {
            return Err(CoreError::Conflict(format!(
                "username already taken: {}",
                username
            )));
        }
        let user = User {
            id: new_id(),
            username: username.to_string(),
            display_name: display_name.map(str::to_string),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> CoreResult<Option<User>> {
        self.check()?;
        Ok(self.tables.read().users.get(id).cloned())
    }

    async fn create_comment(
        &self,
        text: &str,
        recipe_id: &str,
        author_id: &str,
    ) -> CoreResult<Comment> {
        self.check()?;
        let mut tables = self.tables.write();
        let author = tables
            .users
            .get(author_id)
            .map(AuthorSnapshot::from)
            .ok_or_else(|| {
                CoreError::Conflict(format!("comment author does not exist: {}", author_id))
            })?;
        if !tables.recipes.contains_key(recipe_id) {
            return Err(CoreError::Conflict(format!(
                "comment recipe does not exist: {}",
                recipe_id
            )));
        }
        let comment = Comment {
            id: new_id(),
            text: text.to_string(),
            recipe_id: recipe_id.to_string(),
            author_id: author_id.to_string(),
            author,
            created_at: Utc::now(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn comments_for_recipe(&self, recipe_id: &str) -> CoreResult<Vec<Comment>> {
        self.check()?;
        let tables = self.tables.read();
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| c.recipe_id == recipe_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.created_at);
        Ok(comments)
    }

    async fn create_recipe(&self, author_id: &str, input: &RecipeInput) -> CoreResult<Recipe> {
        self.check()?;
        let mut tables = self.tables.write();
        if !tables.users.contains_key(author_id) {
            return Err(CoreError::Conflict(format!(
                "recipe author does not exist: {}",
                author_id
            )));
        }
        let recipe = Recipe {
            id: new_id(),
            title: input.title.clone(),
            description: input.description.clone(),
            cuisine: input.cuisine.clone(),
            difficulty: input.difficulty.clone(),
            cooking_time_minutes: input.cooking_time_minutes,
            author_id: author_id.to_string(),
            created_at: Utc::now(),
            ingredients: input.ingredients.clone(),
            instructions: input.instructions.clone(),
        };
        tables.recipes.insert(recipe.id.clone(), recipe.clone());
        Ok(recipe)
    }

    async fn update_recipe(&self, id: &str, patch: &RecipePatch) -> CoreResult<Recipe> {
        self.check()?;
        let mut tables = self.tables.write();
        let recipe = tables
            .recipes
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("recipe", id))?;
        patch.apply_to(recipe);
        Ok(recipe.clone())
    }

    async fn delete_recipe(&self, id: &str) -> CoreResult<Recipe> {
        self.check()?;
        let mut tables = self.tables.write();
        let recipe = tables
            .recipes
            .remove(id)
            .ok_or_else(|| CoreError::not_found("recipe", id))?;
        tables.comments.retain(|c| c.recipe_id != id);
        Ok(recipe)
    }

    async fn get_recipe(&self, id: &str) -> CoreResult<Option<Recipe>> {
        self.check()?;
        Ok(self.tables.read().recipes.get(id).cloned())
    }

    async fn list_recipes(&self) -> CoreResult<Vec<Recipe>> {
        self.check()?;
        let mut recipes: Vec<Recipe> = self.tables.read().recipes.values().cloned().collect();
        recipes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(recipes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str) -> RecipeInput {
        RecipeInput {
            title: title.to_string(),
            description: None,
            cuisine: "Thai".to_string(),
            difficulty: "hard".to_string(),
            cooking_time_minutes: 45,
            ingredients: Vec::new(),
            instructions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_comment_carries_author_snapshot() {
        let store = InMemoryPrimaryStore::new();
        let user = store.create_user("ana", Some("Ana")).await.unwrap();
        let recipe = store.create_recipe(&user.id, &input("Pad Thai")).await.unwrap();
        let comment = store
            .create_comment("Great dish!", &recipe.id, &user.id)
            .await
            .unwrap();
        assert_eq!(comment.author.username, "ana");
        assert_eq!(comment.author.display_name.as_deref(), Some("Ana"));
        let listed = store.comments_for_recipe(&recipe.id).await.unwrap();
        assert_eq!(listed, vec![comment]);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let store = InMemoryPrimaryStore::new();
        let user = store.create_user("ana", None).await.unwrap();
        assert!(matches!(
            store.create_comment("hi", "missing", &user.id).await,
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            store.create_recipe("ghost", &input("x")).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let store = InMemoryPrimaryStore::new();
        store.create_user("ana", None).await.unwrap();
        assert!(matches!(
            store.create_user("ana", None).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_recipe() {
        let store = InMemoryPrimaryStore::new();
        assert!(matches!(
            store.update_recipe("nope", &RecipePatch::default()).await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete_recipe("nope").await,
            Err(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = InMemoryPrimaryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.list_recipes().await,
            Err(CoreError::TransportUnavailable(_))
        ));
    }
}
