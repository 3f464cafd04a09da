//! Crate-wide error hierarchy for the orchestrator.
//!
//! Mirrors the taxonomy in spec §7 (`InvalidInput`, `NotAuthorized`, …) as a
//! `thiserror` enum composed from the lower layers via `#[from]`, the same
//! shape `provider-adapters::errors::Error` is itself built from.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the orchestrator crate.
///
/// Each variant names the taxonomy kind from spec §7 rather than the Rust
/// type, so API-boundary mapping to HTTP status is a direct match on this
/// enum.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid diff: {0}")]
    InvalidDiff(String),

    #[error("not authorized")]
    NotAuthorized,

    #[error("not found: {0}")]
    NotFound(String),

    /// State-machine violation (e.g. transitioning a terminal review).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Submission queue full / org rate limit hit.
    #[error("busy")]
    Busy,

    #[error("licence blocked: {0}")]
    LicenceBlocked(String),

    #[error(transparent)]
    Provider(#[from] provider_adapters::Error),

    #[error(transparent)]
    Llm(#[from] llm_client::AiLlmError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Maps an upstream provider failure onto the orchestrator taxonomy,
    /// distinguishing caller-retryable conditions from hard failures.
    pub fn classify_provider(e: provider_adapters::Error) -> Self {
        use provider_adapters::{Error as PErr, ProviderError};
        match &e {
            PErr::Provider(ProviderError::Unauthorized | ProviderError::Forbidden) => {
                Error::NotAuthorized
            }
            PErr::Provider(ProviderError::NotFound) => Error::NotFound("change request".into()),
            _ => Error::Provider(e),
        }
    }
}

/// Retry/failure classification for a single batch (spec §4.2, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorKind {
    /// Network, 5xx, or a status that isn't a recognised quota signal.
    Transient,
    /// 429 with quota semantics — diagnostic only, no retry.
    QuotaExhausted,
    /// Structured response failed to parse — one reinforced retry, then fail.
    ParseError,
    /// Response violated a hard invariant (comment outside known lines):
    /// fails the whole review, not just the batch.
    InvariantViolation,
    /// Setup/config is broken in a way no retry will fix (e.g. a bad model
    /// config): fails the whole review, not just the batch.
    Fatal,
}

impl BatchErrorKind {
    pub fn classify(e: &llm_client::AiLlmError) -> Self {
        use llm_client::error_handler::ProviderErrorKind;
        use llm_client::AiLlmError;
        match e {
            AiLlmError::Provider(pe) => match &pe.kind {
                ProviderErrorKind::HttpStatus(http) if http.status.as_u16() == 429 => {
                    BatchErrorKind::QuotaExhausted
                }
                _ => BatchErrorKind::Transient,
            },
            AiLlmError::HttpTransport(_) | AiLlmError::Health(_) | AiLlmError::Ollama(_) => {
                BatchErrorKind::Transient
            }
            AiLlmError::Config(_) => BatchErrorKind::Fatal,
        }
    }
}
