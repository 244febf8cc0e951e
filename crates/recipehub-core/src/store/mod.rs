//! Primary record store abstraction.
//!
//! The [`PrimaryStore`] trait is everything the core needs from the
//! normalized store: comments, recipes with their ingredient and
//! instruction rows, and users. Referential integrity (a comment's author
//! and recipe must exist) is the implementation's job; the core does not
//! re-check it.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_user`](PrimaryStore::create_user) | Insert a user |
//! | [`create_comment`](PrimaryStore::create_comment) | Insert a comment, returning it with an author snapshot |
//! | [`comments_for_recipe`](PrimaryStore::comments_for_recipe) | Comments on a recipe, oldest first |
//! | [`create_recipe`](PrimaryStore::create_recipe) | Insert a recipe and its rows atomically |
//! | [`update_recipe`](PrimaryStore::update_recipe) | Patch a recipe, replacing row lists atomically |
//! | [`delete_recipe`](PrimaryStore::delete_recipe) | Delete a recipe and everything it owns |
//! | [`get_recipe`](PrimaryStore::get_recipe) | Fetch one recipe |
//! | [`list_recipes`](PrimaryStore::list_recipes) | Fetch all recipes |

pub mod memory;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::models::{Comment, Recipe, RecipeInput, RecipePatch, User};

pub use memory::InMemoryPrimaryStore;

#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, username: &str, display_name: Option<&str>) -> CoreResult<User>;

    async fn get_user(&self, id: &str) -> CoreResult<Option<User>>;

    /// Persists a comment. Fails with `Conflict` when the author or recipe
    /// does not exist (foreign-key violation).
    async fn create_comment(
        &self,
        text: &str,
        recipe_id: &str,
        author_id: &str,
    ) -> CoreResult<Comment>;

    async fn comments_for_recipe(&self, recipe_id: &str) -> CoreResult<Vec<Comment>>;

    async fn create_recipe(&self, author_id: &str, input: &RecipeInput) -> CoreResult<Recipe>;

    /// Fails with `NotFound` when the recipe does not exist.
    async fn update_recipe(&self, id: &str, patch: &RecipePatch) -> CoreResult<Recipe>;

    /// Returns the deleted recipe; `NotFound` when absent.
    async fn delete_recipe(&self, id: &str) -> CoreResult<Recipe>;

    async fn get_recipe(&self, id: &str) -> CoreResult<Option<Recipe>>;

    async fn list_recipes(&self) -> CoreResult<Vec<Recipe>>;
}
