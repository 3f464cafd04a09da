//! `GET /api/v1/health` — LLM backend reachability (SPEC_FULL.md §10.6 ambient supplement).

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Response};
use llm_client::HealthStatus;
use serde::Serialize;
use tracing::instrument;

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub backends: Vec<HealthStatus>,
}

#[instrument(name = "health::check", skip(state))]
pub async fn check(State(state): State<Arc<AppState>>) -> Response {
    let backends = state.health_service.check_many(&state.llm_configs).await;
    let ok = !backends.is_empty() && backends.iter().all(|b| b.ok);
    ApiResponse::success(HealthResponse { ok, backends }).into_response_with_status(StatusCode::OK)
}
