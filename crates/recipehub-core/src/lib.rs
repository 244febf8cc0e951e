//! # Recipe Hub Core
//!
//! Storage-agnostic logic for Recipe Hub: data models, the error taxonomy,
//! the in-process event bus, subscription filtering, search-index
//! synchronization, the primary store trait, and the comment notification
//! workflow.
//!
//! This crate contains no sqlx, filesystem or HTTP dependencies. The
//! application crate supplies SQLite-backed [`store::PrimaryStore`] and
//! [`search::SearchIndex`] implementations; the in-memory ones here are
//! used by tests and embedded setups.
//!
//! ```text
//!   comment write ──▶ CommentNotifier ──▶ PrimaryStore
//!                           │
//!                           ▼ (enqueue, best effort)
//!                       EventBus ──▶ FilteredSubscription × N
//!
//!   recipe write ──▶ RecipeService ──▶ PrimaryStore
//!                           │
//!                           ▼
//!                   SearchSynchronizer ──▶ SearchIndex ◀── search query
//! ```

pub mod bus;
pub mod error;
pub mod filter;
pub mod hub;
pub mod models;
pub mod notify;
pub mod recipes;
pub mod search;
pub mod store;

pub use error::{CoreError, CoreResult};
