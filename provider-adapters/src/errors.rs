//! Crate-wide error hierarchy for provider-adapters.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the provider-adapters crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Provider (GitLab/GitHub/Gitea) related failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Unified diff parsing failure.
    #[error(transparent)]
    DiffParse(#[from] DiffParseError),

    /// Configuration problems (bad/missing tokens, base URL, etc.).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Input validation errors (bad IDs, unsupported formats, etc.).
    #[error("validation error: {0}")]
    Validation(String),

    /// Generic catch-all error when nothing else fits.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Provider-specific error used inside the provider layer.
///
/// This is the taxonomy the orchestrator and the API crate classify on;
/// see spec §7's error kinds (`NotAuthorized`, `NotFound`, `Transient`, …).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server error: status {0}")]
    Server(u16),

    #[error("http status error: status {0}")]
    HttpStatus(u16),

    #[error("timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// `422 Unprocessable` — typically an invalid inline position. Per spec
    /// §4.4 this is logged and the comment dropped, not a hard failure.
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// Session/CSRF auth flow (Gitea) could not establish or refresh a session.
    #[error("session auth failed: {0}")]
    SessionAuth(String),

    #[error("unsupported provider operation")]
    Unsupported,
}

/// Unified diff parser errors.
#[derive(Debug, Error)]
pub enum DiffParseError {
    #[error("invalid hunk header: {0}")]
    InvalidHunkHeader(String),

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("integer overflow")]
    Overflow,

    #[error("empty diff")]
    Empty,

    #[error("path escapes repository prefix: {0}")]
    PathEscape(String),
}

/// Configuration and setup errors (base API URL, missing token, etc.).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing provider token")]
    MissingToken,

    #[error("invalid base api url: {0}")]
    InvalidBaseUrl(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(ProviderError::from(e))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                401 => ProviderError::Unauthorized,
                403 => ProviderError::Forbidden,
                404 => ProviderError::NotFound,
                422 => ProviderError::Unprocessable(e.to_string()),
                429 => ProviderError::RateLimited {
                    retry_after_secs: None,
                },
                500..=599 => ProviderError::Server(code),
                _ => ProviderError::HttpStatus(code),
            };
        }
        ProviderError::Network(e.to_string())
    }
}
