//! # Recipe Hub CLI (`rhub`)
//!
//! ## Usage
//!
//! ```bash
//! rhub --config ./config/rhub.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rhub init` | Create the SQLite schema and the search index |
//! | `rhub search [QUERY] --ingredient <name>...` | Search recipes |
//! | `rhub resync <ID>` | Re-derive one recipe's search entry |
//! | `rhub serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! rhub init --config ./config/rhub.toml
//! rhub search "carbonara" --config ./config/rhub.toml
//! rhub search --ingredient eggs --ingredient guanciale
//! rhub serve --config ./config/rhub.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use recipehub::{config, migrate, observability, search, server, sqlite_index};
use recipehub_core::search::SearchIndex;

/// Recipe Hub: live comment fan-out and fuzzy recipe search.
#[derive(Parser)]
#[command(name = "rhub", about = "Recipe Hub backend", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rhub.toml`. When the file is missing, built-in
    /// defaults are used.
    #[arg(long, global = true, default_value = "./config/rhub.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and search index.
    ///
    /// Idempotent: running it multiple times is safe and never reindexes
    /// existing recipes.
    Init,

    /// Search recipes by fuzzy text and required ingredients.
    Search {
        /// Free text matched against titles and descriptions.
        query: Option<String>,

        /// Ingredient every result must contain. Repeatable.
        #[arg(long = "ingredient")]
        ingredients: Vec<String>,
    },

    /// Re-derive one recipe's search entry from the primary store.
    ///
    /// Use after a recipe write reported an index warning.
    Resync {
        /// Recipe id.
        id: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init_tracing();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::info!(path = %cli.config.display(), "config file not found; using defaults");
        config::Config::minimal()
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            let pool = recipehub::db::connect(&cfg).await?;
            let created = sqlite_index::SqliteIndex::new(pool.clone())
                .ensure_index()
                .await?;
            pool.close().await;
            if created {
                tracing::info!("search index created");
            }
            println!("Database initialized successfully.");
        }
        Commands::Search { query, ingredients } => {
            search::run_search(&cfg, query.as_deref(), &ingredients).await?;
        }
        Commands::Resync { id } => {
            search::run_resync(&cfg, &id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
