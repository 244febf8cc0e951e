use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use recipehub::app::App;
use recipehub::config::load_config;
use recipehub::db;
use recipehub::migrate;
use recipehub::sqlite_store::SqlitePrimaryStore;
use recipehub_core::models::{Ingredient, RecipeInput};
use recipehub_core::store::PrimaryStore;

fn rhub_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rhub");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/rhub.sqlite"

[search]
result_limit = 10

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("rhub.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rhub(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rhub_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rhub binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn recipe_input(title: &str, ingredients: &[&str]) -> RecipeInput {
    RecipeInput {
        title: title.to_string(),
        description: None,
        cuisine: "Italian".to_string(),
        difficulty: "easy".to_string(),
        cooking_time_minutes: 25,
        ingredients: ingredients
            .iter()
            .map(|name| Ingredient {
                name: name.to_string(),
                quantity: None,
            })
            .collect(),
        instructions: Vec::new(),
    }
}

/// Inserts recipes straight into the primary store, bypassing the index.
fn seed_primary(config_path: &Path, recipes: &[(&str, &[&str])]) -> Vec<String> {
    let config = load_config(config_path).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let pool = db::connect(&config).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        let store = SqlitePrimaryStore::new(pool.clone());
        let user = store.create_user("seed", None).await.unwrap();
        let mut ids = Vec::new();
        for (title, ingredients) in recipes {
            let recipe = store
                .create_recipe(&user.id, &recipe_input(title, ingredients))
                .await
                .unwrap();
            ids.push(recipe.id);
        }
        pool.close().await;
        ids
    })
}

/// Creates recipes through the normal write path, which also indexes them.
fn seed_indexed(config_path: &Path, recipes: &[(&str, &[&str])]) {
    let config = load_config(config_path).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let app = App::open(&config).await.unwrap();
        let user = app.hub.create_user("seed", None).await.unwrap();
        for (title, ingredients) in recipes {
            let outcome = app
                .hub
                .create_recipe(&user.id, &recipe_input(title, ingredients))
                .await
                .unwrap();
            assert!(outcome.is_synced());
        }
        app.close().await;
    });
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rhub(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/rhub.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_rhub(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_rhub(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_search_empty_query_prints_no_results() {
    let (_tmp, config_path) = setup_test_env();
    run_rhub(&config_path, &["init"]);

    let (stdout, stderr, success) = run_rhub(&config_path, &["search"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_init_does_not_backfill_and_resync_repairs_one() {
    let (_tmp, config_path) = setup_test_env();
    let ids = seed_primary(
        &config_path,
        &[
            ("Spaghetti Carbonara", &["Eggs", "Guanciale", "Pecorino"]),
            ("Cacio e Pepe", &["Pecorino", "Black Pepper"]),
        ],
    );

    let (_, _, success) = run_rhub(&config_path, &["init"]);
    assert!(success);

    let (stdout, _, success) = run_rhub(&config_path, &["search", "--ingredient", "pecorino"]);
    assert!(success);
    assert!(stdout.contains("No results."), "init must not backfill: {}", stdout);

    let (stdout, stderr, success) = run_rhub(&config_path, &["resync", ids[1].as_str()]);
    assert!(success, "resync failed: {}", stderr);
    assert!(stdout.contains(&format!("resynced: {}", ids[1])));

    let (stdout, _, success) = run_rhub(&config_path, &["search", "--ingredient", "PECORINO"]);
    assert!(success);
    assert!(stdout.contains("Cacio e Pepe"));
    assert!(!stdout.contains("Spaghetti Carbonara"));
}

#[test]
fn test_search_conjunction_and_fuzzy_text() {
    let (_tmp, config_path) = setup_test_env();
    seed_indexed(
        &config_path,
        &[
            ("Spaghetti Carbonara", &["eggs", "guanciale"]),
            ("Cacio e Pepe", &["pecorino", "black pepper"]),
        ],
    );

    let (stdout, _, success) = run_rhub(
        &config_path,
        &["search", "--ingredient", "eggs", "--ingredient", "guanciale"],
    );
    assert!(success);
    assert!(stdout.contains("Spaghetti Carbonara"));
    assert!(!stdout.contains("Cacio e Pepe"));

    let (stdout, _, success) = run_rhub(&config_path, &["search", "carbonra"]);
    assert!(success);
    assert!(stdout.contains("Spaghetti Carbonara"));

    let (stdout, _, success) = run_rhub(
        &config_path,
        &["search", "carbonara", "--ingredient", "pecorino"],
    );
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[db]\npath = \"x.sqlite\"\n[search]\nresult_limit = 0\n").unwrap();

    let (_, stderr, success) = run_rhub(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("result_limit"));
}
