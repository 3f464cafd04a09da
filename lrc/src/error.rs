//! CLI error type (spec §6 "Exit 0 on success; 2 on user-skipped; 1 on any
//! other failure").

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not inside a git repository")]
    NotAGitRepo,

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error("no staged changes to review")]
    NoStagedChanges,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("request to {0} failed: {1}")]
    Request(String, String),

    #[error("server rejected the request: {0}")]
    Server(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("user skipped the review")]
    UserSkipped,
}

impl Error {
    /// The process exit code for this error (spec §6): 2 for a deliberate
    /// user skip, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::UserSkipped => 2,
            _ => 1,
        }
    }
}
