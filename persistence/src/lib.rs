//! Relational schema and typed accessors for LiveReview's persistent state
//! (spec §6 "Persistent state layout"): `reviews`, `review_events`,
//! `review_files`, `review_comments`, `activities`, `prompt_chunks`,
//! `application_contexts`, `license_state`.
//!
//! Built on `diesel` + `diesel_migrations` against SQLite, `r2d2`-pooled,
//! following the migration-runner pattern in `leynos-frankie::persistence`
//! (the only example in the retrieval pack with a real ORM/migrations
//! setup). Table accessors use raw `sql_query` rather than Diesel's
//! `table!`/`Queryable` macros — `leynos-frankie`'s own
//! `pr_metadata_cache.rs` does the same, sidestepping a `schema.rs` that
//! would need `diesel print-schema` run against a live database.

pub mod activities;
pub mod application_contexts;
pub mod error;
pub mod license_state;
pub mod pool;
pub mod prompt_chunks;
pub mod reviews;

pub use error::{PersistenceError, Result};
pub use pool::{PooledConn, SqlitePool, connect};
