//! SQLite-backed [`PrimaryStore`] implementation.
//!
//! Recipes are normalized over three tables (`recipes`, `ingredients`,
//! `instructions`). Every multi-statement write runs inside one
//! transaction, so readers never see a recipe with half its rows replaced.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use recipehub_core::models::{
    AuthorSnapshot, Comment, Ingredient, Instruction, Recipe, RecipeInput, RecipePatch, User,
};
use recipehub_core::store::PrimaryStore;
use recipehub_core::{CoreError, CoreResult};

use crate::db::{from_millis, now_millis, store_error};

/// SQLite implementation of the [`PrimaryStore`] trait.
pub struct SqlitePrimaryStore {
    pool: SqlitePool,
}

impl SqlitePrimaryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn user_from_row(row: &SqliteRow) -> CoreResult<User> {
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        created_at: from_millis(row.get("created_at"))?,
    })
}

fn recipe_from_row(
    row: &SqliteRow,
    ingredients: Vec<Ingredient>,
    instructions: Vec<Instruction>,
) -> CoreResult<Recipe> {
    Ok(Recipe {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        cuisine: row.get("cuisine"),
        difficulty: row.get("difficulty"),
        cooking_time_minutes: row.get("cooking_time_minutes"),
        author_id: row.get("author_id"),
        created_at: from_millis(row.get("created_at"))?,
        ingredients,
        instructions,
    })
}

fn comment_from_row(row: &SqliteRow) -> CoreResult<Comment> {
    Ok(Comment {
        id: row.get("id"),
        text: row.get("text"),
        recipe_id: row.get("recipe_id"),
        author_id: row.get("author_id"),
        author: AuthorSnapshot {
            id: row.get("author_id"),
            username: row.get("username"),
            display_name: row.get("display_name"),
        },
        created_at: from_millis(row.get("created_at"))?,
    })
}

async fn load_recipe(conn: &mut SqliteConnection, id: &str) -> CoreResult<Option<Recipe>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, description, cuisine, difficulty, cooking_time_minutes,
               author_id, created_at
        FROM recipes WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(store_error)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let ingredients = sqlx::query(
        "SELECT name, quantity FROM ingredients WHERE recipe_id = ? ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(store_error)?
    .iter()
    .map(|r| Ingredient {
        name: r.get("name"),
        quantity: r.get("quantity"),
    })
    .collect();

    let instructions = sqlx::query(
        "SELECT step, text FROM instructions WHERE recipe_id = ? ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(store_error)?
    .iter()
    .map(|r| Instruction {
        step: r.get("step"),
        text: r.get("text"),
    })
    .collect();

    recipe_from_row(&row, ingredients, instructions).map(Some)
}

async fn insert_ingredients(
    conn: &mut SqliteConnection,
    recipe_id: &str,
    ingredients: &[Ingredient],
) -> CoreResult<()> {
    for (position, ingredient) in ingredients.iter().enumerate() {
        sqlx::query(
            "INSERT INTO ingredients (recipe_id, position, name, quantity) VALUES (?, ?, ?, ?)",
        )
        .bind(recipe_id)
        .bind(position as i64)
        .bind(&ingredient.name)
        .bind(&ingredient.quantity)
        .execute(&mut *conn)
        .await
        .map_err(store_error)?;
    }
    Ok(())
}

async fn insert_instructions(
    conn: &mut SqliteConnection,
    recipe_id: &str,
    instructions: &[Instruction],
) -> CoreResult<()> {
    for (position, instruction) in instructions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO instructions (recipe_id, position, step, text) VALUES (?, ?, ?, ?)",
        )
        .bind(recipe_id)
        .bind(position as i64)
        .bind(instruction.step)
        .bind(&instruction.text)
        .execute(&mut *conn)
        .await
        .map_err(store_error)?;
    }
    Ok(())
}

#[async_trait]
impl PrimaryStore for SqlitePrimaryStore {
    async fn create_user(&self, username: &str, display_name: Option<&str>) -> CoreResult<User> {
        let user = User {
            id: new_id(),
            username: username.to_string(),
            display_name: display_name.map(str::to_string),
            created_at: now_millis(),
        };
        sqlx::query(
            "INSERT INTO users (id, username, display_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(user.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> CoreResult<Option<User>> {
        let row = sqlx::query("SELECT id, username, display_name, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_comment(
        &self,
        text: &str,
        recipe_id: &str,
        author_id: &str,
    ) -> CoreResult<Comment> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let author = sqlx::query("SELECT id, username, display_name FROM users WHERE id = ?")
            .bind(author_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?
            .map(|row| AuthorSnapshot {
                id: row.get("id"),
                username: row.get("username"),
                display_name: row.get("display_name"),
            })
            .ok_or_else(|| {
                CoreError::Conflict(format!("comment author does not exist: {}", author_id))
            })?;

        let recipe_exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM recipes WHERE id = ?")
            .bind(recipe_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;
        if !recipe_exists {
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
            created_at: now_millis(),
        };
        sqlx::query(
            "INSERT INTO comments (id, text, recipe_id, author_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.text)
        .bind(&comment.recipe_id)
        .bind(&comment.author_id)
        .bind(comment.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(comment)
    }

    async fn comments_for_recipe(&self, recipe_id: &str) -> CoreResult<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.text, c.recipe_id, c.author_id, c.created_at,
                   u.username, u.display_name
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.recipe_id = ?
            ORDER BY c.created_at ASC, c.rowid ASC
            "#,
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn create_recipe(&self, author_id: &str, input: &RecipeInput) -> CoreResult<Recipe> {
        let recipe = Recipe {
            id: new_id(),
            title: input.title.clone(),
            description: input.description.clone(),
            cuisine: input.cuisine.clone(),
            difficulty: input.difficulty.clone(),
            cooking_time_minutes: input.cooking_time_minutes,
            author_id: author_id.to_string(),
            created_at: now_millis(),
            ingredients: input.ingredients.clone(),
            instructions: input.instructions.clone(),
        };

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query(
            r#"
            INSERT INTO recipes (id, title, description, cuisine, difficulty,
                                 cooking_time_minutes, author_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&recipe.id)
        .bind(&recipe.title)
        .bind(&recipe.description)
        .bind(&recipe.cuisine)
        .bind(&recipe.difficulty)
        .bind(recipe.cooking_time_minutes)
        .bind(&recipe.author_id)
        .bind(recipe.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        insert_ingredients(&mut tx, &recipe.id, &recipe.ingredients).await?;
        insert_instructions(&mut tx, &recipe.id, &recipe.instructions).await?;

        tx.commit().await.map_err(store_error)?;
        Ok(recipe)
    }

    async fn update_recipe(&self, id: &str, patch: &RecipePatch) -> CoreResult<Recipe> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let mut recipe = load_recipe(&mut tx, id)
            .await?
            .ok_or_else(|| CoreError::not_found("recipe", id))?;
        patch.apply_to(&mut recipe);

        sqlx::query(
            r#"
            UPDATE recipes
            SET title = ?, description = ?, cuisine = ?, difficulty = ?,
                cooking_time_minutes = ?
            WHERE id = ?
            "#,
        )
        .bind(&recipe.title)
        .bind(&recipe.description)
        .bind(&recipe.cuisine)
        .bind(&recipe.difficulty)
        .bind(recipe.cooking_time_minutes)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if patch.ingredients.is_some() {
            sqlx::query("DELETE FROM ingredients WHERE recipe_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
            insert_ingredients(&mut tx, id, &recipe.ingredients).await?;
        }
        if patch.instructions.is_some() {
            sqlx::query("DELETE FROM instructions WHERE recipe_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
            insert_instructions(&mut tx, id, &recipe.instructions).await?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(recipe)
    }

    async fn delete_recipe(&self, id: &str) -> CoreResult<Recipe> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let recipe = load_recipe(&mut tx, id)
            .await?
            .ok_or_else(|| CoreError::not_found("recipe", id))?;
        // Rows in ingredients, instructions and comments cascade.
        sqlx::query("DELETE FROM recipes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;
        Ok(recipe)
    }

    async fn get_recipe(&self, id: &str) -> CoreResult<Option<Recipe>> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        load_recipe(&mut conn, id).await
    }

    async fn list_recipes(&self) -> CoreResult<Vec<Recipe>> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;

        let mut ingredients: HashMap<String, Vec<Ingredient>> = HashMap::new();
        for row in sqlx::query("SELECT recipe_id, name, quantity FROM ingredients ORDER BY recipe_id, position")
            .fetch_all(&mut *conn)
            .await
            .map_err(store_error)?
        {
            ingredients
                .entry(row.get("recipe_id"))
                .or_default()
                .push(Ingredient {
                    name: row.get("name"),
                    quantity: row.get("quantity"),
                });
        }

        let mut instructions: HashMap<String, Vec<Instruction>> = HashMap::new();
        for row in sqlx::query("SELECT recipe_id, step, text FROM instructions ORDER BY recipe_id, position")
            .fetch_all(&mut *conn)
            .await
            .map_err(store_error)?
        {
            instructions
                .entry(row.get("recipe_id"))
                .or_default()
                .push(Instruction {
                    step: row.get("step"),
                    text: row.get("text"),
                });
        }

        let rows = sqlx::query(
            r#"
            SELECT id, title, description, cuisine, difficulty, cooking_time_minutes,
                   author_id, created_at
            FROM recipes
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(store_error)?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                recipe_from_row(
                    row,
                    ingredients.remove(&id).unwrap_or_default(),
                    instructions.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }
}
