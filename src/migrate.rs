//! Primary schema migrations.
//!
//! Every statement is idempotent, so `rhub init` can run any number of
//! times. The search tables are not created here: they belong to
//! [`SqliteIndex::ensure_index`](crate::sqlite_index::SqliteIndex).

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the primary tables and indexes on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipes (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            cuisine TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            cooking_time_minutes INTEGER NOT NULL,
            author_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (author_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create recipes table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingredients (
            recipe_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            quantity TEXT,
            PRIMARY KEY (recipe_id, position),
            FOREIGN KEY (recipe_id) REFERENCES recipes(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create ingredients table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instructions (
            recipe_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            step INTEGER NOT NULL,
            text TEXT NOT NULL,
            PRIMARY KEY (recipe_id, position),
            FOREIGN KEY (recipe_id) REFERENCES recipes(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create instructions table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            recipe_id TEXT NOT NULL,
            author_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (recipe_id) REFERENCES recipes(id) ON DELETE CASCADE,
            FOREIGN KEY (author_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create comments table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_comments_recipe ON comments(recipe_id, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recipes_created_at ON recipes(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}
