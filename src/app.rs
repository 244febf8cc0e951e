//! Wiring of the SQLite backends, the in-process bus and the [`Hub`].

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use recipehub_core::bus::InProcessBus;
use recipehub_core::hub::Hub;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_index::SqliteIndex;
use crate::sqlite_store::SqlitePrimaryStore;

/// A running application: one bus, one pool, one hub.
pub struct App {
    pub hub: Arc<Hub>,
    pub bus: Arc<InProcessBus>,
    pub pool: SqlitePool,
}

impl App {
    /// Opens the database, applies migrations and makes sure the search
    /// index exists. Must run inside a tokio runtime.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let bus = Arc::new(InProcessBus::new(config.bus.subscriber_queue_capacity));
        let hub = Hub::new(
            bus.clone(),
            Arc::new(SqlitePrimaryStore::new(pool.clone())),
            Arc::new(SqliteIndex::new(pool.clone())),
            config.hub_settings(),
        );
        hub.bootstrap()
            .await
            .context("Failed to bootstrap search index")?;

        Ok(Self {
            hub: Arc::new(hub),
            bus,
            pool,
        })
    }

    /// Drains notifications, closes the bus, then the pool.
    pub async fn close(self) {
        self.hub.shutdown().await;
        self.pool.close().await;
    }
}
