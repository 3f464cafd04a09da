//! Error type for prompt rendering and chunk management (spec §4.3, §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown prompt key: {0}")]
    UnknownPromptKey(String),

    #[error("template decryption failed: {0}")]
    Decrypt(String),

    #[error("malformed placeholder: {0}")]
    MalformedPlaceholder(String),

    #[error("chunk source lookup failed: {0}")]
    ChunkSource(String),
}
