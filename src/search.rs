//! `rhub search` and `rhub resync`: the recipe index from the command line.

use anyhow::Result;

use recipehub_core::models::SearchDocument;

use crate::app::App;
use crate::config::Config;

/// Runs a query against the index. Returns an empty list when neither
/// text nor any ingredient is given.
pub async fn search_recipes(
    config: &Config,
    query: Option<&str>,
    ingredients: &[String],
) -> Result<Vec<SearchDocument>> {
    let app = App::open(config).await?;
    let required = if ingredients.is_empty() {
        None
    } else {
        Some(ingredients)
    };
    let results = app.hub.search_recipes(query, required).await;
    app.close().await;
    Ok(results?)
}

/// CLI entry point: calls [`search_recipes`] and prints results to stdout.
pub async fn run_search(config: &Config, query: Option<&str>, ingredients: &[String]) -> Result<()> {
    let results = search_recipes(config, query, ingredients).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, doc) in results.iter().enumerate() {
        println!("{}. {}", i + 1, doc.title);
        println!(
            "    cuisine: {}  difficulty: {}  time: {} min",
            doc.cuisine, doc.difficulty, doc.cooking_time_minutes
        );
        if !doc.ingredient_terms.is_empty() {
            let terms: Vec<&str> = doc.ingredient_terms.iter().map(String::as_str).collect();
            println!("    ingredients: {}", terms.join(", "));
        }
        if !doc.description.is_empty() {
            println!("    excerpt: \"{}\"", doc.description.replace('\n', " ").trim());
        }
        println!("    id: {}", doc.id);
        println!();
    }

    Ok(())
}

/// `rhub resync <ID>`: repairs one recipe's index entry after a write
/// that came back with an index warning. A recipe that no longer exists is
/// removed from the index instead.
pub async fn run_resync(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let result = app.hub.resync_recipe(id).await;
    app.close().await;
    result?;
    println!("resynced: {}", id);
    Ok(())
}
