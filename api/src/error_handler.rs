use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::core::http::response_envelope::ApiResponse;

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error(transparent)]
    Config(#[from] llm_client::ConfigError),

    // --- IO / network / server ---
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / routing ---
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Orchestrator(#[from] orchestrator::errors::Error),

    #[error(transparent)]
    Persistence(#[from] persistence::PersistenceError),

    #[error(transparent)]
    Licensing(#[from] licensing::Error),

    #[error(transparent)]
    PromptManager(#[from] prompt_manager::error::Error),

    #[error(transparent)]
    Provider(#[from] provider_adapters::Error),

    /// Rich HTTP error mapped from lower layers with specific status & code.
    #[error("{message}")]
    Http {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        use orchestrator::errors::Error as OrchErr;
        match self {
            AppError::MissingEnv(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Http { status, .. } => *status,
            AppError::Bind(_) | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,

            AppError::Orchestrator(e) => match e {
                OrchErr::InvalidDiff(_) => StatusCode::BAD_REQUEST,
                OrchErr::NotAuthorized => StatusCode::UNAUTHORIZED,
                OrchErr::NotFound(_) => StatusCode::NOT_FOUND,
                OrchErr::Conflict(_) => StatusCode::CONFLICT,
                OrchErr::Busy => StatusCode::TOO_MANY_REQUESTS,
                OrchErr::LicenceBlocked(_) => StatusCode::PAYMENT_REQUIRED,
                OrchErr::Provider(_) | OrchErr::Llm(_) | OrchErr::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Persistence(persistence::PersistenceError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Licensing(_) => StatusCode::BAD_REQUEST,
            AppError::PromptManager(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingEnv(_) => "MISSING_ENV",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Bind(_) => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound => "NOT_FOUND",
            AppError::Orchestrator(_) => "ORCHESTRATOR_ERROR",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::Licensing(_) => "LICENCE_ERROR",
            AppError::PromptManager(_) => "PROMPT_ERROR",
            AppError::Provider(_) => "PROVIDER_ERROR",
            AppError::Http { code, .. } => code,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        let resp: ApiResponse<()> = ApiResponse::error(self.error_code(), message, Vec::new());
        resp.into_response_with_status(status)
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(err: axum::extract::rejection::QueryRejection) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
