//! # Recipe Hub
//!
//! Application layer for Recipe Hub: configuration, SQLite persistence,
//! the HTTP server and the `rhub` CLI. Storage-agnostic logic (event bus,
//! subscription filters, search synchronization, comment notification)
//! lives in the `recipehub-core` crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────────┐
//! │   HTTP   │──▶│     Hub      │──▶│ SQLite primary store │
//! │ JSON+SSE │   │ (core crate) │   └─────────────────────┘
//! └──────────┘   │              │   ┌─────────────────────┐
//! ┌──────────┐   │              │──▶│ SQLite search index  │
//! │   CLI    │──▶│              │   └─────────────────────┘
//! │  (rhub)  │   │              │──▶ in-process event bus ──▶ SSE clients
//! └──────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection and error mapping |
//! | [`migrate`] | Primary schema migrations |
//! | [`sqlite_store`] | SQLite [`PrimaryStore`](recipehub_core::store::PrimaryStore) |
//! | [`sqlite_index`] | SQLite [`SearchIndex`](recipehub_core::search::SearchIndex) |
//! | [`app`] | Wiring of bus, stores and hub |
//! | [`search`] | `rhub search` and `rhub resync` |
//! | [`server`] | HTTP server |
//! | [`observability`] | Tracing setup |

pub mod app;
pub mod config;
pub mod db;
pub mod migrate;
pub mod observability;
pub mod search;
pub mod server;
pub mod sqlite_index;
pub mod sqlite_store;
