//! Error type for offline/online licence validation (spec §4.5).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("licence token is malformed: {0}")]
    Malformed(String),

    #[error("no cached public key for kid {0}")]
    UnknownKid(String),

    #[error("licence signature does not verify")]
    SignatureMismatch,

    #[error("licence has expired")]
    Expired,

    #[error("online validation request failed: {0}")]
    Network(String),

    #[error("online validator rejected the token: {0}")]
    Rejected(String),
}
