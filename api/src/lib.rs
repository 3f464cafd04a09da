pub mod core;
pub mod error_handler;
pub mod prompt_store;
pub mod routes;
pub mod store;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

pub use error_handler::{AppError, AppResult};

use crate::core::app_state::AppState;

/// Builds the full router: every handler behind `/api/v1`, state shared
/// via `Arc<AppState>` (spec.md §6's HTTP surface, plus the Discovery and
/// Health endpoints this implementation adds on top of it).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/diff-review", post(routes::diff_review::submit))
        .route("/api/v1/diff-review/{id}", get(routes::diff_review::get))
        .route("/api/v1/diff-review/{id}/events", get(routes::diff_review::events))
        .route("/api/v1/review", get(routes::diff_review::most_recent))
        .route("/api/v1/activities", get(routes::activities::list))
        .route("/api/v1/license/update", post(routes::license::update))
        .route("/api/v1/license/status", get(routes::license::status))
        .route("/api/v1/webhooks/{provider}/{kind}", post(routes::webhooks::receive))
        .route("/api/v1/providers/{kind}/repos", get(routes::discovery::repos))
        .route("/api/v1/health", get(routes::health::check))
        .with_state(state)
}

/// Reads configuration, connects every backing service, and serves the
/// API until the process is signalled to stop.
pub async fn start() -> AppResult<()> {
    let state = Arc::new(AppState::from_env().await?);
    state.licence.spawn_scheduler();

    let addr = format!("0.0.0.0:{}", state.backend_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(AppError::Bind)?;

    tracing::info!(%addr, mode = ?state.mode, "livereview api listening");

    let app = router(state);
    axum::serve(listener, app).await.map_err(AppError::Server)?;

    Ok(())
}
