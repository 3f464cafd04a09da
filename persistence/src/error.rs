//! Error type for persistence operations (spec §7, §9 "storage is behind a
//! trait").

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database URL must not be blank")]
    BlankDatabaseUrl,

    #[error("failed to connect to database: {0}")]
    Connection(String),

    #[error("failed to acquire a pooled connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("failed to run database migrations: {0}")]
    Migration(String),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode failed: {0}")]
    Decode(String),
}
