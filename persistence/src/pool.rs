//! r2d2-pooled SQLite connections, Diesel's standard pairing for concurrent
//! access from the orchestrator's worker pool and the API's read handlers
//! (spec §10.1).

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::error::{PersistenceError, Result};

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = diesel::r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Builds a connection pool and runs pending migrations against `database_url`.
pub fn connect(database_url: &str) -> Result<SqlitePool> {
    if database_url.trim().is_empty() {
        return Err(PersistenceError::BlankDatabaseUrl);
    }
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .build(manager)
        .map_err(|e| PersistenceError::Connection(e.to_string()))?;

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| PersistenceError::Migration(e.to_string()))?;

    Ok(pool)
}
