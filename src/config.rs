//! TOML configuration.
//!
//! Every section except `[db]` is optional; missing keys fall back to the
//! defaults below.
//!
//! ```toml
//! [db]
//! path = "./data/recipehub.sqlite"
//!
//! [bus]
//! subscriber_queue_capacity = 256
//! notify_queue_capacity = 1024
//!
//! [search]
//! timeout_ms = 2000
//! result_limit = 50
//!
//! [store]
//! timeout_ms = 5000
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use recipehub_core::hub::HubSettings;
use recipehub_core::search::SearchSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
    #[serde(default = "default_notify_queue_capacity")]
    pub notify_queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
            notify_queue_capacity: default_notify_queue_capacity(),
        }
    }
}

fn default_subscriber_queue_capacity() -> usize {
    256
}
fn default_notify_queue_capacity() -> usize {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_search_timeout_ms(),
            result_limit: default_result_limit(),
        }
    }
}

fn default_search_timeout_ms() -> u64 {
    2000
}
fn default_result_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_store_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Defaults for every section, with the database under `./data`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/recipehub.sqlite"),
            },
            bus: BusConfig::default(),
            search: SearchConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            notify_queue_capacity: self.bus.notify_queue_capacity,
            store_timeout: Duration::from_millis(self.store.timeout_ms),
            search: SearchSettings {
                timeout: Duration::from_millis(self.search.timeout_ms),
                result_limit: self.search.result_limit,
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.bus.subscriber_queue_capacity == 0 {
        anyhow::bail!("bus.subscriber_queue_capacity must be > 0");
    }
    if config.bus.notify_queue_capacity == 0 {
        anyhow::bail!("bus.notify_queue_capacity must be > 0");
    }
    if config.search.timeout_ms == 0 {
        anyhow::bail!("search.timeout_ms must be > 0");
    }
    if config.search.result_limit < 1 {
        anyhow::bail!("search.result_limit must be >= 1");
    }
    if config.store.timeout_ms == 0 {
        anyhow::bail!("store.timeout_ms must be > 0");
    }
    Ok(())
}
